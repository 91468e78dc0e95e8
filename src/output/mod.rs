pub mod request_dump;
pub mod writer;

pub use request_dump::RequestDump;
pub use writer::ArtifactWriter;
