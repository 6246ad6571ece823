use base64::{engine::general_purpose, Engine as _};
use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, PatchOperation, RemoveOperation, ReplaceOperation};
use serde_json::Value;

/// An ordered list of RFC 6902 operations. The API server applies them in
/// sequence, so an operation may rely on the ones queued before it
/// (e.g. creating a parent object before adding a member to it).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Patch {
    operations: Vec<PatchOperation>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PointerBuf, value: Value) -> &mut Self {
        self.operations
            .push(PatchOperation::Add(AddOperation { path, value }));
        self
    }

    pub fn remove(&mut self, path: PointerBuf) -> &mut Self {
        self.operations
            .push(PatchOperation::Remove(RemoveOperation { path }));
        self
    }

    pub fn replace(&mut self, path: PointerBuf, value: Value) -> &mut Self {
        self.operations
            .push(PatchOperation::Replace(ReplaceOperation { path, value }));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.operations
    }

    pub fn into_json_patch(self) -> json_patch::Patch {
        json_patch::Patch(self.operations)
    }

    /// Returns the base64 encoded JSON array expected by the `patch` field
    /// of an admission response, or `None` when there is nothing to change.
    pub fn encode(&self) -> Result<Option<String>, serde_json::Error> {
        if self.is_empty() {
            return Ok(None);
        }

        let json = serde_json::to_vec(&self.operations)?;
        Ok(Some(general_purpose::STANDARD.encode(json)))
    }
}
