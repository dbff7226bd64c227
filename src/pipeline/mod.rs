pub mod checksum;
pub mod compress;
pub mod encrypt;

pub use checksum::*;
pub use compress::*;
pub use encrypt::*;
