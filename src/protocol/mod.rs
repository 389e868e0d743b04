pub mod command;
pub mod fields;
pub mod guide;
pub mod registry;
pub mod render;
pub mod scanner;
pub mod stream;

pub use command::{build, build_block, Command, ScheduleAction, ValidationError, View};
pub use fields::{parse_fields, FieldMap};
pub use registry::{lookup, TagKind, TagSpec};
pub use render::{escape_html, render};
pub use scanner::{scan, Document, RawBlock, Segment};
pub use stream::StreamBuffer;
