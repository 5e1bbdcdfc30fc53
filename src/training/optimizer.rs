//! SGD with momentum
//!
//! Burn's optimizer step consumes the gradients, so there is no separate
//! zero-grad call: each step starts from the gradients of a fresh backward
//! pass.

use burn::{
    module::AutodiffModule,
    optim::{
        adaptor::OptimizerAdaptor, momentum::MomentumConfig, GradientsParams, Optimizer, Sgd,
        SgdConfig,
    },
    tensor::backend::AutodiffBackend,
};

/// Momentum SGD at a fixed learning rate
pub struct MomentumSgd<B: AutodiffBackend, M: AutodiffModule<B>> {
    optimizer: OptimizerAdaptor<Sgd<B::InnerBackend>, M, B>,
    learning_rate: f64,
    momentum: f64,
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> MomentumSgd<B, M> {
    /// Classic momentum without dampening or Nesterov correction
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        let optimizer = SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(momentum)
                    .with_dampening(0.0)
                    .with_nesterov(false),
            ))
            .init();

        Self {
            optimizer,
            learning_rate,
            momentum,
        }
    }

    /// Apply one update and return the new parameters
    pub fn step(&mut self, model: M, grads: GradientsParams) -> M {
        self.optimizer.step(self.learning_rate, model, grads)
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};
    use burn::tensor::{Tensor, TensorData};

    type TestBackend = Autodiff<NdArray>;

    fn weights(model: &Linear<TestBackend>) -> Vec<f32> {
        model.weight.val().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_step_moves_against_gradient() {
        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(2, 1).with_bias(false).init(&device);
        let before = weights(&model);

        // d(sum(w . x))/dw = x = [1, 1]
        let x = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![1.0f32, 1.0], [1, 2]), &device);
        let loss = model.forward(x).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);

        let mut sgd = MomentumSgd::new(0.1, 0.9);
        let model = sgd.step(model, grads);
        let after = weights(&model);

        for (b, a) in before.iter().zip(after.iter()) {
            assert!((b - 0.1 - a).abs() < 1e-5, "expected {} - 0.1, got {}", b, a);
        }
        assert_eq!(sgd.learning_rate(), 0.1);
        assert_eq!(sgd.momentum(), 0.9);
    }

    #[test]
    fn test_momentum_accumulates() {
        let device = Default::default();
        let mut model: Linear<TestBackend> = LinearConfig::new(1, 1).with_bias(false).init(&device);
        let start = weights(&model)[0];
        let mut sgd = MomentumSgd::new(0.1, 0.9);

        for _ in 0..2 {
            let x = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![1.0f32], [1, 1]), &device);
            let loss = model.forward(x).sum();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = sgd.step(model, grads);
        }

        // Velocity after two unit gradients: 1, then 0.9 * 1 + 1 = 1.9
        let expected = start - 0.1 * (1.0 + 1.9);
        assert!((weights(&model)[0] - expected).abs() < 1e-5);
    }
}
