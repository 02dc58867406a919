pub mod exif;
pub mod filesystem;
pub mod guess;
pub mod resolver;
pub mod validate;
pub mod xmp;

pub use resolver::{DatePreference, DateResolver, DateResolverBuilder, DateSource, Resolution};
pub use validate::{validate, CanonicalDate};
