#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod chip;
pub mod codec;
pub mod config;
pub mod error;
pub mod fault_class;
pub mod group;
pub mod intersection;
pub mod log;
pub mod range;
pub mod repair;

pub use colored;

pub use chip::ChipDomain;
pub use codec::{AddressCodec, Field};
pub use config::{build_module, EccConfig, ModuleConfig};
pub use error::{Error, Result};
pub use fault_class::FaultClass;
pub use group::{Domain, GroupDomain};
pub use range::{ChipId, FaultIntersection, FaultRange};
pub use repair::{Failures, FaultCount, RepairScheme};
