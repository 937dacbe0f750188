pub mod clip;
pub mod codec;
pub mod constants;
pub mod error;
pub mod format;
pub mod keywords;
pub mod layer;
pub mod layer1d;
pub mod layer2d;
pub mod reader;
pub mod ring;
pub mod transform;
pub mod view;
