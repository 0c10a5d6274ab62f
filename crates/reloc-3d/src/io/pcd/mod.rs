mod parser;
pub use parser::{read_pcd, PcdError};
