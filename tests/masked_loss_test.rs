use approx::assert_abs_diff_eq;
use maskmetric::prelude::*;
use ndarray::{Axis, Zip, array};

/// Log-softmax over the last axis, with its gradient
fn log_softmax() -> Lambda {
    Lambda::new("LogSoftmax", 1, 1, |xs| {
        let x = &xs[0];
        let mut out = x.clone();
        for mut lane in out.lanes_mut(Axis(x.ndim() - 1)) {
            let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let log_sum_exp = lane.mapv(|v| (v - max).exp()).sum().ln() + max;
            lane.mapv_inplace(|v| v - log_sum_exp);
        }
        Ok(vec![out])
    })
    .with_grad(|xs, gs| {
        let (x, g) = (&xs[0], &gs[0]);
        let axis = Axis(x.ndim() - 1);
        let mut grad = g.clone();
        for ((lane, x_lane), g_lane) in grad
            .lanes_mut(axis)
            .into_iter()
            .zip(x.lanes(axis))
            .zip(g.lanes(axis))
        {
            let max = x_lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let exps = x_lane.mapv(|v| (v - max).exp());
            let total = exps.sum();
            let g_sum = g_lane.sum();
            Zip::from(lane)
                .and(&exps)
                .for_each(|o, &e| *o -= e / total * g_sum);
        }
        Ok(vec![grad])
    })
}

#[test]
fn gradient_descent_lowers_masked_cross_entropy() {
    let mut logits = Tensor::zeros(vec![4, 3]);
    // Position 2 is padding.
    let targets = array![1.0, 2.0, 0.0, 1.0].into_dyn();

    let mut loss =
        MaskedLoss::new(serial![log_softmax(), cross_entropy_loss_scalar(Some(0.0), false)])
            .unwrap();

    let initial = loss.compute_loss(&targets, &logits).unwrap();
    assert_abs_diff_eq!(initial, 3.0f32.ln(), epsilon = 1e-5);

    for _ in 0..100 {
        let grad = loss.compute_grad(&targets, &logits).unwrap();
        logits = &logits - &grad;
    }

    let trained = loss.compute_loss(&targets, &logits).unwrap();
    assert!(trained < 0.5 * initial, "loss {} did not drop from {}", trained, initial);

    // The padded row never receives a gradient.
    let padded: f32 = logits.index_axis(Axis(0), 2).iter().map(|v| v.abs()).sum();
    assert_eq!(padded, 0.0);

    let mut accuracy = accuracy_scalar(Some(0.0), false);
    let out = call(&mut accuracy, vec![logits, targets]).unwrap();
    assert_eq!(out[0].sum(), 1.0);
}

#[test]
fn gradient_descent_fits_l2_targets() {
    let target = array![[1.0, -1.0], [0.5, 2.0], [3.0, 0.0]].into_dyn();
    let mut prediction = Tensor::zeros(vec![3, 2]);
    let mut loss = MaskedLoss::l2(None);

    for _ in 0..200 {
        let grad = loss.compute_grad(&target, &prediction).unwrap();
        prediction = &prediction - &(grad * 0.5);
    }

    assert!(loss.compute_loss(&target, &prediction).unwrap() < 1e-6);
    for (p, t) in prediction.iter().zip(target.iter()) {
        assert_abs_diff_eq!(*p, *t, epsilon = 1e-3);
    }
}

#[test]
fn weighted_loss_uses_fixed_weights() {
    let log_probs = array![[-0.5, -1.0], [-0.1, -3.0], [-2.0, -0.2]].into_dyn();
    let targets = array![1.0, 0.0, 0.0].into_dyn();
    let weights = array![1.0, 1.0, 3.0].into_dyn();

    let mut loss =
        MaskedLoss::with_weights(cross_entropy_loss_scalar(None, true), weights).unwrap();
    // (1.0 * 1 + 0.1 * 1 + 2.0 * 3) / 5
    assert_abs_diff_eq!(
        loss.compute_loss(&targets, &log_probs).unwrap(),
        1.42,
        epsilon = 1e-6
    );

    let grad = loss.compute_grad(&targets, &log_probs).unwrap();
    assert_abs_diff_eq!(grad[[2, 0]], -0.6, epsilon = 1e-6);
    assert_abs_diff_eq!(grad[[2, 1]], 0.0);
}

#[test]
fn masked_loss_checks_layer_arity() {
    assert!(matches!(
        MaskedLoss::new(cross_entropy_loss_scalar(None, true)),
        Err(ModelError::InputValidationError(_))
    ));
    assert!(matches!(
        MaskedLoss::with_weights(cross_entropy_loss_scalar(None, false), scalar(1.0)),
        Err(ModelError::InputValidationError(_))
    ));
    assert!(MaskedLoss::new(Dup::new()).is_err());
}

#[test]
fn cross_entropy_loss_matches_manual_computation() {
    let log_probs = array![[-0.5, -1.0, -2.0], [-0.1, -3.0, -3.0]].into_dyn();
    let targets = array![2.0, 1.0].into_dyn();

    let mut loss = MaskedLoss::cross_entropy(None);
    assert_abs_diff_eq!(
        loss.compute_loss(&targets, &log_probs).unwrap(),
        2.5,
        epsilon = 1e-6
    );
}

#[test]
fn loss_layer_description() {
    let expected = "\
Serial_in2_out1[
  Serial_in2_out1[
    Parallel_in2_out3[
      Identity_in1_out1
      Dup_in1_out2
    ]
    Parallel_in3_out2[
      CrossEntropy_in2_out1
      WeightMask_in1_out1
    ]
    WeightedMean_in2_out1
  ]
  Negate_in1_out1
]
";
    assert_eq!(describe(&cross_entropy_loss_scalar(None, false)), expected);
}
