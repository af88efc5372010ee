//! One codec per pipeline step kind.

pub mod clean;
pub mod features_target;
pub mod inspection;
pub mod linear_regression;
pub mod read_csv;
pub mod split;

pub use clean::{CleanCodec, CleanOperation, CleanParams, FillStrategy, FillValueKind};
pub use features_target::{FeaturesTargetCodec, FeaturesTargetParams};
pub use inspection::{InspectionCodec, InspectionParams};
pub use linear_regression::{LinearRegressionCodec, LinearRegressionParams};
pub use read_csv::{ReadCsvCodec, ReadCsvParams};
pub use split::{SplitCodec, SplitName, SplitParams};
