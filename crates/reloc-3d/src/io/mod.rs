/// PCD reader module.
pub mod pcd;
