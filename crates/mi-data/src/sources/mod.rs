pub mod csv_sample;
pub mod tdms;

pub use csv_sample::{sample, sample_rows, Sample};
pub use tdms::TdmsFile;
