pub mod analysis;
pub mod decode;
pub mod fft;
pub mod normalize;
pub mod realign;
pub mod signal;
pub mod sync;
pub mod timing;
pub mod window;
