mod descriptor;
mod headers;
mod pattern;

pub use descriptor::{DescriptorStore, StreamDescriptor};
pub use headers::normalize_headers;
pub use pattern::{find_manifest_url, is_manifest_path, parse_expires};
