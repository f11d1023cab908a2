use burn::{prelude::*, tensor::activation};
use nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{MaxPool2d, MaxPool2dConfig},
    Dropout, DropoutConfig, Linear, LinearConfig, Relu,
};

#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: MaxPool2d,
    dropout: Dropout,
    linear1: Linear<B>,
    linear2: Linear<B>,
    activation: Relu,
    l2: f64,
    num_classes: usize,
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = "3")]
    pub num_classes: usize,
    /// Side of the square RGB input.
    #[config(default = "150")]
    pub image_size: usize,
    #[config(default = "512")]
    pub hidden_size: usize,
    #[config(default = "0.5")]
    pub dropout: f64,
    /// L2 factor on the convolution kernels.
    #[config(default = "0.001")]
    pub l2: f64,
}

const CHANNELS: [usize; 4] = [3, 32, 64, 128];

impl ModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        let conv = |stage: usize| {
            Conv2dConfig::new([CHANNELS[stage], CHANNELS[stage + 1]], [3, 3]).init(device)
        };

        Model {
            conv1: conv(0),
            conv2: conv(1),
            conv3: conv(2),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            linear1: LinearConfig::new(self.flattened_size(), self.hidden_size).init(device),
            linear2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
            l2: self.l2,
            num_classes: self.num_classes,
        }
    }

    /// Spatial side after the three valid 3x3 convolutions and 2x2 pools.
    pub fn feature_side(&self) -> usize {
        (0..3).fold(self.image_size, |side, _| side.saturating_sub(2) / 2)
    }

    pub fn flattened_size(&self) -> usize {
        let side = self.feature_side();
        CHANNELS[3] * side * side
    }
}

impl<B: Backend> Model<B> {
    /// # Shapes
    ///   - Input [batch_size, 3, size, size]
    ///   - Output [batch_size, num_classes] (logits)
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stage(&self.conv1, images);
        let x = self.stage(&self.conv2, x);
        let x = self.stage(&self.conv3, x);

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.linear1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.linear2.forward(x)
    }

    fn stage(&self, conv: &Conv2d<B>, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = conv.forward(x);
        let x = self.activation.forward(x);
        self.pool.forward(x)
    }

    /// Class probabilities.
    pub fn forward_softmax(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        activation::softmax(self.forward(images), 1)
    }

    /// `l2 * sum(w^2)` over the convolution kernels; biases and dense layers are not penalised.
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        let squared = |conv: &Conv2d<B>| {
            let weight = conv.weight.val();
            (weight.clone() * weight).sum()
        };

        (squared(&self.conv1) + squared(&self.conv2) + squared(&self.conv3)).mul_scalar(self.l2)
    }

    /// Forward pass plus categorical cross-entropy against one-hot `labels`,
    /// with the kernel penalty added.
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        labels: Tensor<B, 2>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let log_probs = activation::log_softmax(output.clone(), 1);
        let cross_entropy = (log_probs * labels.clone()).sum_dim(1).mean().neg();
        let loss = cross_entropy + self.l2_penalty();

        ClassificationOutput {
            loss,
            output,
            labels,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

pub struct ClassificationOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub output: Tensor<B, 2>,
    pub labels: Tensor<B, 2>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn small() -> ModelConfig {
        ModelConfig::new().with_image_size(22).with_hidden_size(8)
    }

    #[test]
    fn default_topology_flattens_to_128_by_17_by_17() {
        let config = ModelConfig::new();
        assert_eq!(config.num_classes, 3);
        assert_eq!(config.feature_side(), 17);
        assert_eq!(config.flattened_size(), 128 * 17 * 17);
    }

    #[test]
    fn forward_yields_one_row_per_image() {
        let device = Default::default();
        let model = small().init::<B>(&device);

        let images = Tensor::<B, 4>::ones([2, 3, 22, 22], &device);
        let probs = model.forward_softmax(images);

        assert_eq!(probs.dims(), [2, 3]);
        let sums = probs.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn penalty_scales_with_l2_factor() {
        let device = Default::default();
        B::seed(11);
        let with = small().init::<B>(&device);
        let without = Model {
            l2: 0.0,
            ..with.clone()
        };

        let penalty: f32 = with.l2_penalty().into_scalar();
        let zero: f32 = without.l2_penalty().into_scalar();

        assert!(penalty > 0.0);
        assert_eq!(zero, 0.0);
    }

    #[test]
    fn classification_loss_includes_penalty() {
        let device = Default::default();
        let model = small().init::<B>(&device);
        let images = Tensor::<B, 4>::zeros([2, 3, 22, 22], &device);
        let labels = Tensor::<B, 2>::from_floats([[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]], &device);

        let out = model.forward_classification(images, labels);
        let loss: f32 = out.loss.into_scalar();
        let penalty: f32 = model.l2_penalty().into_scalar();

        assert!(loss.is_finite());
        assert!(loss > penalty);
    }
}
