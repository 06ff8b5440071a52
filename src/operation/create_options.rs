use crate::CreateMode;

/// Payload and mode of a node created through
/// [`Operations::create_with_options`](crate::Operations::create_with_options)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub data: Vec<u8>,
    pub mode: CreateMode,
}

impl CreateOptions {
    pub fn new(
        data: impl Into<Vec<u8>>,
        mode: CreateMode,
    ) -> Self {
        Self {
            data: data.into(),
            mode,
        }
    }

    /// Persistent node holding `data`
    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        Self::new(data, CreateMode::Persistent)
    }
}
