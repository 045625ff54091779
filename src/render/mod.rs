//! Rendering a template from a single set of flag values, or once per
//! record of a JSON array read from a stream.

pub mod flags;
pub mod stream;

use serde_json::{Map, Value};

/// Name to value mapping a template is executed against
pub type RenderContext = Map<String, Value>;

pub use flags::render_flags;
pub use stream::render_stream;
