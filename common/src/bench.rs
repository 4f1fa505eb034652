use core::fmt::Debug;
use std::path::Path;

use dyn_clone::{DynClone, clone_trait_object};

use crate::{error::ReportError, run::RunParams};

#[typetag::serde(tag = "type")]
pub trait Bench: Debug + DynClone + Send + Sync {
    fn name(&self) -> &'static str;
    /// Expands the experiment into one parameter set per external invocation
    ///
    /// Arguments:
    /// * `experiment` - The experiment name from the config, usable in output names
    /// * `data_dir` - The directory every output csv must land in
    fn runs(&self, experiment: &str, data_dir: &Path) -> Result<Vec<RunParams>, ReportError>;
}
clone_trait_object!(Bench);
