use attnpool::{AttentionPooling, AttentionPoolingConfig, Float};
use ndarray::{Array2, Array3, array};
use ndarray_rand::{
    RandomExt,
    rand::{SeedableRng, rngs::StdRng},
    rand_distr::Uniform,
};

const EPSILON: Float = 1e-2;
const TOLERANCE: Float = 2e-3;

fn pool_with_bound(bound: Float) -> AttentionPooling {
    AttentionPooling::with_config(AttentionPoolingConfig {
        init_bound: bound,
        seed: Some(17),
        ..Default::default()
    })
}

fn loss(pool: &AttentionPooling, x: &Array3<Float>, mask: &Array2<Float>, d_loss: &Array2<Float>) -> Float {
    let y = pool
        .predict(x.view().into_dyn(), Some(mask.view().into_dyn()))
        .unwrap();
    (d_loss * &y).sum()
}

fn max_abs_diff<D: ndarray::Dimension>(a: &ndarray::Array<Float, D>, b: &ndarray::Array<Float, D>) -> Float {
    (a - b).iter().fold(0., |acc: Float, v| acc.max(v.abs()))
}

#[test]
fn input_gradients() {
    let (batch_size, seq_len, features) = (2, 4, 3);
    let mut rng = StdRng::seed_from_u64(5);

    let mut pool = pool_with_bound(0.8);
    let x = Array3::<Float>::random_using((batch_size, seq_len, features), Uniform::new(-1., 1.), &mut rng);
    let mask = array![[1., 1., 1., 0.], [1., 0., 1., 1.]];
    let d_loss = Array2::<Float>::random_using((batch_size, features), Uniform::new(0., 1.), &mut rng);

    // Analytical gradient via backward pass
    pool.forward(x.view().into_dyn(), Some(mask.view().into_dyn()), true)
        .unwrap();
    let dx_analytical = pool.backward(d_loss.clone());

    // Numerical gradient via central differences
    let mut dx_numerical = Array3::<Float>::zeros(x.dim());
    for b in 0..batch_size {
        for s in 0..seq_len {
            for f in 0..features {
                let mut x_plus = x.clone();
                let mut x_minus = x.clone();
                x_plus[[b, s, f]] += EPSILON;
                x_minus[[b, s, f]] -= EPSILON;

                let loss_plus = loss(&pool, &x_plus, &mask, &d_loss);
                let loss_minus = loss(&pool, &x_minus, &mask, &d_loss);
                dx_numerical[[b, s, f]] = (loss_plus - loss_minus) / (2. * EPSILON);
            }
        }
    }

    let max_diff = max_abs_diff(&dx_analytical, &dx_numerical);
    println!("analytical:\n{:.5}", dx_analytical);
    println!("numerical:\n{:.5}", dx_numerical);
    println!("max absolute difference: {:.2e}", max_diff);

    assert!(
        max_diff < TOLERANCE,
        "input gradients are incorrect: expected max diff < {TOLERANCE}, got {max_diff:.2e}"
    );

    // padded steps receive no gradient
    for f in 0..features {
        assert_eq!(dx_analytical[[0, 3, f]], 0.);
        assert_eq!(dx_analytical[[1, 1, f]], 0.);
    }
}

#[test]
fn parameter_gradients() {
    let (batch_size, seq_len, features) = (3, 5, 4);
    let mut rng = StdRng::seed_from_u64(6);

    let mut pool = pool_with_bound(0.8);
    let x = Array3::<Float>::random_using((batch_size, seq_len, features), Uniform::new(-1., 1.), &mut rng);
    let mask = array![
        [1., 1., 1., 1., 1.],
        [1., 1., 1., 0., 0.],
        [1., 0., 0., 0., 0.]
    ];
    let d_loss = Array2::<Float>::random_using((batch_size, features), Uniform::new(-1., 1.), &mut rng);

    pool.forward(x.view().into_dyn(), Some(mask.view().into_dyn()), true)
        .unwrap();
    pool.backward(d_loss.clone());
    let dp_analytical = pool.d_attention_param.clone();

    let mut dp_numerical = Array2::<Float>::zeros(dp_analytical.dim());
    for f in 0..features {
        let original = pool.attention_param[[f, 0]];

        pool.attention_param[[f, 0]] = original + EPSILON;
        let loss_plus = loss(&pool, &x, &mask, &d_loss);

        pool.attention_param[[f, 0]] = original - EPSILON;
        let loss_minus = loss(&pool, &x, &mask, &d_loss);

        pool.attention_param[[f, 0]] = original;
        dp_numerical[[f, 0]] = (loss_plus - loss_minus) / (2. * EPSILON);
    }

    let max_diff = max_abs_diff(&dp_analytical, &dp_numerical);
    println!("analytical: {:.5}", dp_analytical);
    println!("numerical: {:.5}", dp_numerical);
    println!("max absolute difference: {:.2e}", max_diff);

    assert!(
        max_diff < TOLERANCE,
        "attention_param gradients are incorrect: expected max diff < {TOLERANCE}, got {max_diff:.2e}"
    );
}
