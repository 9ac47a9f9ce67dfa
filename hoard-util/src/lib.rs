pub mod rtti;

pub use {ahash, eyre, once_cell, parking_lot};
