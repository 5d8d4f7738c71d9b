pub mod annotation;
pub mod archive;
pub mod augment;
pub mod crop;
pub mod equalize;
pub mod labels;
pub mod sample;
pub mod utils;
pub mod workers;
