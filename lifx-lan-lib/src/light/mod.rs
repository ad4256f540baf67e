// Conversions between the device-native color and power representation and the
// shapes handed to callers. Nothing in here performs I/O.
pub mod color;
pub mod state;
