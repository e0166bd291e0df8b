use attnpool::{Float, ShapeError, nn::PadMask};
use ndarray::{Array2, Array3, array};

#[test]
fn zero_mask_from_padded_batch() {
    let x: Array3<Float> = array![
        [[1., 2.], [0., 0.], [0., 0.]],
        [[1., -1.], [0.5, 0.], [0., 0.]],
    ];

    assert_eq!(PadMask::zero_mask_batch(&x), array![[1., 0., 0.], [1., 1., 0.]]);
}

#[test]
fn time_mask_accepts_both_layouts() {
    let mask_2d: Array2<Float> = array![[1., 0.], [1., 1.]];
    let mask_3d = mask_2d.clone().insert_axis(ndarray::Axis(2));

    assert_eq!(PadMask::time_mask(mask_2d.view().into_dyn(), 2, 2), Ok(mask_2d.clone()));
    assert_eq!(PadMask::time_mask(mask_3d.view().into_dyn(), 2, 2), Ok(mask_2d));
}

#[test]
fn time_mask_rejects_other_shapes() {
    let shapes: [&[usize]; 5] = [&[2], &[2, 3], &[3, 2], &[2, 2, 2], &[2, 2, 1, 1]];

    for shape in shapes {
        let mask = ndarray::ArrayD::<Float>::ones(shape);
        assert_eq!(
            PadMask::time_mask(mask.view(), 2, 2),
            Err(ShapeError::MaskShape {
                shape: shape.to_vec(),
                batch: 2,
                seq_len: 2
            })
        );
    }
}
