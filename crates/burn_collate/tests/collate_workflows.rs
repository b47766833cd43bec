//! End-to-end collation of detection-style samples.
//!
//! Covers:
//! 1. Nesting shape and key order survive collation
//! 2. Host-only and list containers regroup without loss
//! 3. Stackable images pad to the group's max size
//! 4. Batch-level failures (bad group size, non-sequence input)

use burn::tensor::{Int, Tensor, TensorData};
use burn_collate::{
    collate, BatchMode, CollateBackend, CollateError, DataContainer, TensorValue, Value,
};

type B = CollateBackend;

fn image(values: Vec<f32>, shape: [usize; 3]) -> Tensor<B, 3> {
    Tensor::from_data(TensorData::new(values, shape), &Default::default())
}

fn boxes(count: usize, offset: f32) -> Tensor<B, 2> {
    let values = (0..count * 4).map(|i| offset + i as f32).collect::<Vec<_>>();
    Tensor::from_data(TensorData::new(values, [count, 4]), &Default::default())
}

/// One detection sample: stacked image, listed boxes, host-only metadata, a
/// raw scalar and a raw pair.
fn sample(index: usize, h: usize, w: usize) -> Value<B> {
    let img = image(vec![index as f32 + 1.0; 3 * h * w], [3, h, w]);
    Value::map([
        ("img", DataContainer::stacked(img, 0.0).into()),
        ("gt_bboxes", DataContainer::listed(boxes(index + 1, index as f32)).into()),
        (
            "img_meta",
            DataContainer::host_only(Value::<B>::map([
                ("filename", Value::Str(format!("frame_{index:05}.png"))),
                ("ori_shape", Value::seq([Value::Int(h as i64), Value::Int(w as i64)])),
            ]))
            .into(),
        ),
        ("frame_id", Value::Int(index as i64)),
        ("pair", Value::seq([Value::Float(index as f64), Value::Str(format!("s{index}"))])),
    ])
}

fn ungroup(container: &DataContainer<B>) -> Vec<Value<B>> {
    container
        .groups()
        .expect("collated container holds groups")
        .iter()
        .flat_map(|group| group.as_seq().expect("group is a list").to_vec())
        .collect()
}

#[test]
fn collated_record_mirrors_sample_shape() -> anyhow::Result<()> {
    let batch = Value::seq((0..4).map(|i| sample(i, 4, 4)));
    let out = collate(batch, 2)?;

    let keys: Vec<_> = out.as_map().expect("mapping").keys().cloned().collect();
    assert_eq!(keys, ["img", "gt_bboxes", "img_meta", "frame_id", "pair"]);

    let frame_ids = out.get("frame_id").and_then(Value::as_tensor).expect("tensor");
    assert_eq!(frame_ids.dims(), vec![4]);
    assert_eq!(frame_ids.clone().into_i64_vec()?, vec![0, 1, 2, 3]);

    let pair = out.get("pair").and_then(Value::as_seq).expect("pair stays a sequence");
    assert_eq!(pair.len(), 2);
    let firsts = pair[0].as_tensor().expect("floats stack");
    assert_eq!(firsts.clone().into_f32_vec()?, vec![0.0, 1.0, 2.0, 3.0]);
    let names = pair[1].as_seq().expect("strings stay a list");
    assert_eq!(names.len(), 4);
    assert!(matches!(&names[3], Value::Str(s) if s == "s3"));
    Ok(())
}

#[test]
fn host_only_container_regroups_without_loss() -> anyhow::Result<()> {
    let batch = Value::seq((0..6).map(|i| sample(i, 2, 2)));
    let out = collate(batch, 3)?;
    let meta = out.get("img_meta").and_then(Value::as_container).expect("container");

    assert_eq!(meta.mode(), BatchMode::HostOnly);
    assert!(meta.cpu_only());
    let groups = meta.groups().expect("groups");
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| g.as_seq().map(<[_]>::len) == Some(3)));

    let names: Vec<_> = ungroup(meta)
        .iter()
        .map(|m| match m.get("filename") {
            Some(Value::Str(s)) => s.clone(),
            other => panic!("unexpected filename {other:?}"),
        })
        .collect();
    let expected: Vec<_> = (0..6).map(|i| format!("frame_{i:05}.png")).collect();
    assert_eq!(names, expected);
    Ok(())
}

#[test]
fn list_container_keeps_ragged_tensors() -> anyhow::Result<()> {
    let batch = Value::seq((0..4).map(|i| sample(i, 2, 2)));
    let out = collate(batch, 2)?;
    let gt = out.get("gt_bboxes").and_then(Value::as_container).expect("container");

    assert_eq!(gt.mode(), BatchMode::List);
    assert!(!gt.cpu_only());
    let flat = ungroup(gt);
    assert_eq!(flat.len(), 4);
    for (i, value) in flat.into_iter().enumerate() {
        let t = value.into_tensor().expect("boxes tensor");
        assert_eq!(t.dims(), vec![i + 1, 4]);
        let expected = (0..(i + 1) * 4).map(|k| i as f32 + k as f32).collect::<Vec<_>>();
        assert_eq!(t.into_f32_vec()?, expected);
    }
    Ok(())
}

#[test]
fn stacked_images_pad_to_group_max() -> anyhow::Result<()> {
    // 2x2, 3x2 and 2x3 single-channel images in one group of three.
    let samples: Vec<Value<B>> = vec![
        DataContainer::stacked(image(vec![1.0; 4], [1, 2, 2]), 0.0).into(),
        DataContainer::stacked(image(vec![2.0; 6], [1, 3, 2]), 0.0).into(),
        DataContainer::stacked(image(vec![3.0; 6], [1, 2, 3]), 0.0).into(),
    ];
    let out = collate(Value::Seq(samples), 3)?;
    let container = out.as_container().expect("container");
    let groups = container.groups().expect("groups");
    assert_eq!(groups.len(), 1);

    let stacked = groups[0].as_tensor().expect("stacked tensor").clone();
    assert_eq!(stacked.dims(), vec![3, 1, 3, 3]);
    #[rustfmt::skip]
    let expected = vec![
        1.0, 1.0, 0.0,
        1.0, 1.0, 0.0,
        0.0, 0.0, 0.0,

        2.0, 2.0, 0.0,
        2.0, 2.0, 0.0,
        2.0, 2.0, 0.0,

        3.0, 3.0, 3.0,
        3.0, 3.0, 3.0,
        0.0, 0.0, 0.0,
    ];
    assert_eq!(stacked.into_f32_vec()?, expected);
    Ok(())
}

#[test]
fn each_group_pads_independently_with_its_own_fill() -> anyhow::Result<()> {
    let samples: Vec<Value<B>> = vec![
        DataContainer::stacked(image(vec![1.0; 2], [2, 1, 1]), -1.0).into(),
        DataContainer::stacked(image(vec![1.0; 8], [2, 2, 2]), -1.0).into(),
        DataContainer::stacked(image(vec![5.0; 2], [2, 1, 1]), 7.0).into(),
        DataContainer::stacked(image(vec![5.0; 2], [2, 1, 1]), 7.0).into(),
    ];
    let out = collate(Value::Seq(samples), 2)?;
    let container = out.as_container().expect("container");
    assert_eq!(container.padding_value(), -1.0);
    let groups = container.groups().expect("groups");
    assert_eq!(groups.len(), 2);

    let first = groups[0].as_tensor().expect("tensor").clone();
    assert_eq!(first.dims(), vec![2, 2, 2, 2]);
    let first = first.into_f32_vec()?;
    // Sample 0, channel 0: one real pixel then -1 padding.
    assert_eq!(&first[0..4], &[1.0, -1.0, -1.0, -1.0]);

    let second = groups[1].as_tensor().expect("tensor").clone();
    assert_eq!(second.dims(), vec![2, 2, 1, 1]);
    assert_eq!(second.into_f32_vec()?, vec![5.0; 4]);
    Ok(())
}

#[test]
fn nested_sequences_of_containers_are_transposed() -> anyhow::Result<()> {
    let batch = Value::<B>::seq((0..2).map(|i| {
        Value::seq([
            DataContainer::host_only(Value::Int(i)).into(),
            Value::Int(i * 10),
        ])
    }));
    let out = collate(batch, 1)?;
    let fields = out.as_seq().expect("sequence");
    assert_eq!(fields.len(), 2);
    let dc = fields[0].as_container().expect("container");
    assert_eq!(dc.groups().map(<[_]>::len), Some(2));
    let ints = fields[1].as_tensor().expect("int tensor");
    assert_eq!(ints.kind(), "int");
    assert_eq!(ints.clone().into_i64_vec()?, vec![0, 10]);
    Ok(())
}

#[test]
fn raw_tensors_stack_by_default() -> anyhow::Result<()> {
    let device = Default::default();
    let labels = (0..3).map(|i| {
        Value::from(Tensor::<B, 1, Int>::from_data(
            TensorData::new(vec![i as i64, i as i64 + 1], [2]),
            &device,
        ))
    });
    let out = collate(Value::seq(labels), 1)?;
    let t = out.into_tensor().expect("stacked");
    assert!(matches!(t, TensorValue::Int2(_)));
    assert_eq!(t.dims(), vec![3, 2]);
    Ok(())
}

#[test]
fn indivisible_group_size_fails() {
    let batch = Value::seq((0..3).map(|i| sample(i, 2, 2)));
    let err = collate(batch, 2).unwrap_err();
    assert!(matches!(
        err,
        CollateError::IndivisibleGroups {
            len: 3,
            samples_per_gpu: 2
        }
    ));
}

#[test]
fn non_sequence_batch_fails() {
    let err = collate(sample(0, 2, 2), 1).unwrap_err();
    assert!(matches!(
        err,
        CollateError::UnsupportedBatch { kind: "mapping" }
    ));
}

#[test]
fn host_only_payloads_stay_put_on_device_transfer() -> anyhow::Result<()> {
    let batch = Value::seq((0..2).map(|i| sample(i, 2, 2)));
    let device = Default::default();
    let out = collate(batch, 2)?.to_device(&device);
    let meta = out.get("img_meta").and_then(Value::as_container).expect("container");
    assert!(meta.cpu_only());
    assert_eq!(ungroup(meta).len(), 2);
    let img = out.get("img").and_then(Value::as_container).expect("container");
    let stacked = img.groups().expect("groups")[0].as_tensor().expect("tensor");
    assert_eq!(stacked.device(), device);
    Ok(())
}
