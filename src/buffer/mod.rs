//! C2H transfer buffers: a single-page variant and a multi-page scatter variant.

mod scatter;
mod single;

pub use scatter::ScatterBuffer;
pub use single::SingleBuffer;
