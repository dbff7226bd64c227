pub mod decode;
pub mod encode;
pub mod info;
pub mod key;

pub use decode::*;
pub use encode::*;
pub use info::*;
pub use key::*;
