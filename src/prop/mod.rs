//! Property system: typed accessors, schemas, and the inflater

pub mod inflate;
pub mod reader;
pub mod value;

pub use inflate::{InflateScope, InflateSpec, PropertyConfig, StructInflater};
pub use reader::{
    fill_scalar_props_from_json, is_merged_tag, scalar_props_to_json, PropBag, PropertyReadSetter,
    PropertyReadSetConfigurer, PropertyReader,
};
pub use value::{PlayerIndex, PropKind, PropValue, PropertySchema};
