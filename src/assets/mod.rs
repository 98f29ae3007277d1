//! Adapters around the compilation primitives: SCSS, fonts and the
//! JavaScript bundle. Each one writes its artifacts below the output root
//! and reports the files it wrote.

pub mod bundle;
pub mod fonts;
pub mod style;

pub use bundle::{BundleOptions, Bundler};
pub use fonts::copy_fonts;
pub use style::StyleCompiler;
