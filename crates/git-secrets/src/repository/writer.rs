use crate::error::Result;

/// Persists mutations of the project document.
///
/// Every call re-validates the whole document and refuses to write an
/// invalid one.
pub trait ConfigWriter {
    /// Store an already encoded secret in `context`
    fn set_secret(&mut self, context: &str, name: &str, encoded_value: &str, force: bool)
        -> Result<()>;

    fn set_config(&mut self, context: &str, name: &str, value: &str, force: bool) -> Result<()>;

    fn add_context(&mut self, name: &str) -> Result<()>;

    /// Append a mapping to a render target, creating the target if needed
    fn add_file_to_render(&mut self, target: &str, file_in: &str, file_out: &str) -> Result<()>;

    fn write_config(&self) -> Result<()>;
}
