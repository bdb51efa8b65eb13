pub mod adb;

pub use adb::{AdbDevice, AdbError};
