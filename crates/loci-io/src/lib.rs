pub mod nifti_io;

pub use nifti_io::{read_nifti, write_nifti};
