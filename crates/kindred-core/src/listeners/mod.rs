//! Ready-made match listeners.

mod evaluation;
mod link_store;
mod logging;
mod recorder;

use crate::error::{KindredError, KindredResult};
use crate::model::PropertyModel;
use crate::types::Record;

pub use evaluation::{EvaluationListener, EvaluationReport, ReportHandle};
pub use link_store::LinkStoreListener;
pub use logging::LoggingListener;
pub use recorder::{EventRecorder, RecordedEvent};

/// Identity value of a record, or a listener error if it has none.
fn identity_of<'r>(model: &PropertyModel, record: &'r Record) -> KindredResult<&'r str> {
    model.identity(record).ok_or_else(|| {
        KindredError::listener(format!(
            "record has no value for identity property {}",
            model.identity_property().name()
        ))
    })
}
