pub mod iostat;

pub use iostat::{IoRates, IoSample, VmIoSampler};
