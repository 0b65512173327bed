//! Model collaborator contract.

use crate::dataset::panel::{Panel, PanelView};
use crate::error::Result;

/// Narrow contract a predictive model exposes to the dataset pipeline.
///
/// Training consumes time-sliced views of an assembled panel; prediction
/// returns one score per panel row, which callers append via
/// [`Panel::add_column`]. Model internals (boosting, regularization,
/// search) are outside this crate.
pub trait AlphaModel {
    /// Train on a panel view, optionally with a validation view.
    fn fit(&mut self, train: &PanelView<'_>, valid: Option<&PanelView<'_>>) -> Result<()>;

    /// Score every row of a panel, in row order.
    fn predict(&self, panel: &Panel) -> Result<Vec<f64>>;
}
