//! CNN Model Architecture for CIFAR-10 Classification
//!
//! The network is an ordered list of tagged layers folded over a single
//! feature value. Two convolution stages reduce a `[N, 3, 32, 32]` batch to
//! `[N, 64, 8, 8]`, which is flattened to 4096 features and passed through a
//! two-layer classifier head.

use burn::{
    config::Config,
    module::{Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig,
        PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Int, Tensor},
};

/// Side length of the square input images
pub const IMAGE_SIZE: usize = 32;
/// Number of input channels (RGB)
pub const IN_CHANNELS: usize = 3;
/// Width of the flattened feature vector entering the classifier head
pub const FLAT_FEATURES: usize = 64 * 8 * 8;
/// Hidden width of the classifier head
pub const HIDDEN_FEATURES: usize = 1024;

/// Configuration for the CIFAR CNN
#[derive(Config, Debug)]
pub struct CifarCnnConfig {
    /// Number of output classes
    #[config(default = "10")]
    pub class_count: usize,

    /// Dropout rate applied before both fully connected layers
    #[config(default = "0.0")]
    pub dropout: f64,
}

/// Reshapes `[N, C, H, W]` into `[N, C * H * W]`.
#[derive(Module, Clone, Debug, Default)]
pub struct Flatten;

/// One stage of the network.
#[derive(Module, Debug)]
pub enum Layer<B: Backend> {
    Convolution(Conv2d<B>),
    Normalization(BatchNorm<B>),
    Activation(Relu),
    Pool(MaxPool2d),
    Flatten(Flatten),
    Dropout(Dropout),
    FullyConnected(Linear<B>),
}

/// Value flowing between layers: image-shaped before `Flatten`, a feature
/// matrix after it.
#[derive(Debug, Clone)]
pub enum FeatureMap<B: Backend> {
    Spatial(Tensor<B, 4>),
    Flat(Tensor<B, 2>),
}

impl<B: Backend> FeatureMap<B> {
    fn into_spatial(self, layer: &str) -> Tensor<B, 4> {
        match self {
            FeatureMap::Spatial(x) => x,
            FeatureMap::Flat(x) => panic!(
                "{} layer expects [N, C, H, W] input, got {:?}",
                layer,
                x.dims()
            ),
        }
    }

    fn into_flat(self, layer: &str) -> Tensor<B, 2> {
        match self {
            FeatureMap::Flat(x) => x,
            FeatureMap::Spatial(x) => panic!(
                "{} layer expects [N, F] input, got {:?}",
                layer,
                x.dims()
            ),
        }
    }
}

impl<B: Backend> Layer<B> {
    /// Short name used in logs and shape errors
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Convolution(_) => "convolution",
            Layer::Normalization(_) => "normalization",
            Layer::Activation(_) => "activation",
            Layer::Pool(_) => "pool",
            Layer::Flatten(_) => "flatten",
            Layer::Dropout(_) => "dropout",
            Layer::FullyConnected(_) => "fully connected",
        }
    }

    /// Apply this layer to the running feature value.
    pub fn forward(&self, x: FeatureMap<B>) -> FeatureMap<B> {
        match self {
            Layer::Convolution(conv) => FeatureMap::Spatial(conv.forward(x.into_spatial(self.name()))),
            Layer::Normalization(bn) => match x {
                FeatureMap::Spatial(x) => FeatureMap::Spatial(bn.forward(x)),
                // BatchNorm normalizes over dim 1, so features become channels
                FeatureMap::Flat(x) => {
                    let [n, f] = x.dims();
                    FeatureMap::Flat(bn.forward(x.reshape([n, f, 1])).reshape([n, f]))
                }
            },
            Layer::Activation(relu) => match x {
                FeatureMap::Spatial(x) => FeatureMap::Spatial(relu.forward(x)),
                FeatureMap::Flat(x) => FeatureMap::Flat(relu.forward(x)),
            },
            Layer::Pool(pool) => FeatureMap::Spatial(pool.forward(x.into_spatial(self.name()))),
            Layer::Flatten(_) => {
                let x = x.into_spatial(self.name());
                let [n, c, h, w] = x.dims();
                FeatureMap::Flat(x.reshape([n, c * h * w]))
            }
            Layer::Dropout(dropout) => match x {
                FeatureMap::Spatial(x) => FeatureMap::Spatial(dropout.forward(x)),
                FeatureMap::Flat(x) => FeatureMap::Flat(dropout.forward(x)),
            },
            Layer::FullyConnected(linear) => FeatureMap::Flat(linear.forward(x.into_flat(self.name()))),
        }
    }
}

/// CIFAR-10 classifier
///
/// Architecture:
/// - Conv 3->32 (5x5, pad 2), BatchNorm, ReLU, MaxPool 2x2
/// - Conv 32->64 (5x5, pad 2), BatchNorm, ReLU, MaxPool 2x2
/// - Flatten to 4096
/// - Dropout, Linear 4096->1024, BatchNorm
/// - Dropout, Linear 1024->class_count
#[derive(Module, Debug)]
pub struct CifarCnn<B: Backend> {
    layers: Vec<Layer<B>>,
    class_count: usize,
}

fn kaiming_normal() -> Initializer {
    Initializer::KaimingNormal {
        gain: 2f64.sqrt(),
        fan_out_only: false,
    }
}

fn zero_bias<B: Backend>(size: usize, device: &B::Device) -> Option<Param<Tensor<B, 1>>> {
    Some(Initializer::Zeros.init([size], device))
}

fn conv_stage<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> [Layer<B>; 4] {
    let mut conv = Conv2dConfig::new([in_channels, out_channels], [5, 5])
        .with_padding(PaddingConfig2d::Explicit(2, 2))
        .with_initializer(kaiming_normal())
        .init(device);
    conv.bias = zero_bias(out_channels, device);

    [
        Layer::Convolution(conv),
        Layer::Normalization(BatchNormConfig::new(out_channels).init(device)),
        Layer::Activation(Relu::new()),
        Layer::Pool(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()),
    ]
}

fn fully_connected<B: Backend>(d_input: usize, d_output: usize, device: &B::Device) -> Layer<B> {
    let mut linear = LinearConfig::new(d_input, d_output)
        .with_initializer(kaiming_normal())
        .init(device);
    linear.bias = zero_bias(d_output, device);
    Layer::FullyConnected(linear)
}

impl CifarCnnConfig {
    /// Build the network on `device` with Kaiming-normal weights and zero biases.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CifarCnn<B> {
        let mut layers = Vec::with_capacity(15);
        layers.extend(conv_stage(IN_CHANNELS, 32, device));
        layers.extend(conv_stage(32, 64, device));
        layers.push(Layer::Flatten(Flatten));

        layers.push(Layer::Dropout(DropoutConfig::new(self.dropout).init()));
        layers.push(fully_connected(FLAT_FEATURES, HIDDEN_FEATURES, device));
        layers.push(Layer::Normalization(BatchNormConfig::new(HIDDEN_FEATURES).init(device)));

        layers.push(Layer::Dropout(DropoutConfig::new(self.dropout).init()));
        layers.push(fully_connected(HIDDEN_FEATURES, self.class_count, device));

        CifarCnn {
            layers,
            class_count: self.class_count,
        }
    }
}

impl<B: Backend> CifarCnn<B> {
    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `images` - Input tensor of shape [batch_size, 3, 32, 32]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, class_count]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.layers
            .iter()
            .fold(FeatureMap::Spatial(images), |x, layer| layer.forward(x))
            .into_flat("output")
    }

    /// Index of the highest logit per image
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 1, Int> {
        let [n, _, _, _] = images.dims();
        self.forward(images).argmax(1).reshape([n])
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    pub fn layers(&self) -> &[Layer<B>] {
        &self.layers
    }
}
