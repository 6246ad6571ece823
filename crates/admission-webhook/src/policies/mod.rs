mod compute_unit;

pub use compute_unit::{
    ComputeUnit, ComputeUnitCatalog, ComputeUnitError, ComputeUnitPolicy,
    DEFAULT_ANNOTATION_PREFIX,
};
