//! Small ordered key/value property lists.
//!
//! Used to pass option bags to plugins. Lists hold a handful of entries, so
//! lookup is a linear scan in insertion order and duplicate keys are kept
//! (the first one wins on [`PropertyList::get`]).
//!
//! Three kinds of value exist, each with its own ownership rule:
//!
//! - [`PropertyValue::Const`]: a plain integer, nothing to release.
//! - [`PropertyValue::Bytes`]: an owned buffer, deep-copied on clone.
//! - [`PropertyValue::Complex`]: an opaque payload whose release and copy
//!   are delegated to a caller-supplied [`ComplexType`].

use crate::error::{Error, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Maximum key length in bytes. Longer keys are truncated.
pub const MAX_KEY_LEN: usize = 31;

/// Capacity of a fresh list.
const MIN_PROPS: usize = 2;

// ============================================================================
// Complex values
// ============================================================================

/// Payload of a [`PropertyValue::Complex`] entry.
pub struct ComplexValue {
    /// The payload. `None` once reclaimed.
    pub value: Option<Box<dyn Any + Send + Sync>>,
    /// Size the caller associates with the payload.
    pub size: usize,
    /// Extra data for the type operations.
    pub userdata: usize,
}

impl ComplexValue {
    /// Wrap a payload.
    pub fn new<T: Any + Send + Sync>(value: T, size: usize) -> Self {
        Self {
            value: Some(Box::new(value)),
            size,
            userdata: 0,
        }
    }

    /// Attach extra data for the type operations.
    pub fn with_userdata(mut self, userdata: usize) -> Self {
        self.userdata = userdata;
        self
    }

    /// Borrow the payload as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.as_deref()?.downcast_ref()
    }

    /// Mutably borrow the payload as `T`.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.as_deref_mut()?.downcast_mut()
    }
}

impl fmt::Debug for ComplexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComplexValue")
            .field("present", &self.value.is_some())
            .field("size", &self.size)
            .field("userdata", &self.userdata)
            .finish()
    }
}

/// Release and copy operations for a complex payload.
pub trait ComplexType: Send + Sync {
    /// Release the payload. Called once when the owning list is freed.
    fn reclaim(&self, value: &mut ComplexValue) -> Result<()>;

    /// Produce an independent copy for a cloned list.
    fn copy(&self, value: &ComplexValue) -> Result<ComplexValue>;
}

// ============================================================================
// Properties
// ============================================================================

/// Value of one property.
pub enum PropertyValue {
    /// Integer constant.
    Const(usize),
    /// Owned byte buffer. Strings include their trailing NUL.
    Bytes(Vec<u8>),
    /// Opaque payload with caller-supplied operations.
    Complex(ComplexValue, Arc<dyn ComplexType>),
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Const(v) => f.debug_tuple("Const").field(v).finish(),
            PropertyValue::Bytes(b) => {
                let escaped = b.escape_ascii().to_string();
                f.debug_tuple("Bytes").field(&escaped).finish()
            }
            PropertyValue::Complex(v, _) => f.debug_tuple("Complex").field(v).finish(),
        }
    }
}

/// A key and its value.
#[derive(Debug)]
pub struct Property {
    key: String,
    value: PropertyValue,
}

impl Property {
    /// The (possibly truncated) key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value.
    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    /// Mutable access to the value.
    pub fn value_mut(&mut self) -> &mut PropertyValue {
        &mut self.value
    }

    /// Size of the value: `0` for constants, the buffer length for bytes,
    /// the caller's size for complex payloads.
    pub fn size(&self) -> usize {
        match &self.value {
            PropertyValue::Const(_) => 0,
            PropertyValue::Bytes(bytes) => bytes.len(),
            PropertyValue::Complex(value, _) => value.size,
        }
    }

    /// The constant, if this is a `Const` entry.
    pub fn as_const(&self) -> Option<usize> {
        match self.value {
            PropertyValue::Const(v) => Some(v),
            _ => None,
        }
    }

    /// The bytes, if this is a `Bytes` entry.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            PropertyValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The payload, if this is a `Complex` entry.
    pub fn as_complex(&self) -> Option<&ComplexValue> {
        match &self.value {
            PropertyValue::Complex(value, _) => Some(value),
            _ => None,
        }
    }

    fn try_clone(&self) -> Result<Property> {
        let value = match &self.value {
            PropertyValue::Const(v) => PropertyValue::Const(*v),
            PropertyValue::Bytes(bytes) => {
                let mut copy = Vec::new();
                copy.try_reserve_exact(bytes.len())
                    .map_err(|_| Error::OutOfMemory)?;
                copy.extend_from_slice(bytes);
                PropertyValue::Bytes(copy)
            }
            PropertyValue::Complex(value, ops) => {
                PropertyValue::Complex(ops.copy(value)?, Arc::clone(ops))
            }
        };
        Ok(Property {
            key: self.key.clone(),
            value,
        })
    }
}

/// Truncate `key` to at most [`MAX_KEY_LEN`] bytes on a char boundary.
fn truncate_key(key: &str) -> &str {
    if key.len() <= MAX_KEY_LEN {
        return key;
    }
    let mut end = MAX_KEY_LEN;
    while !key.is_char_boundary(end) {
        end -= 1;
    }
    &key[..end]
}

// ============================================================================
// PropertyList
// ============================================================================

/// Ordered list of properties.
///
/// Dropping a list runs the same reclaim pass as [`free`](Self::free), with
/// any failure only logged.
#[derive(Debug)]
pub struct PropertyList {
    props: Vec<Property>,
}

impl PropertyList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            props: Vec::with_capacity(MIN_PROPS),
        }
    }

    /// Append an integer constant.
    pub fn add(&mut self, key: &str, value: usize) -> Result<()> {
        self.push(key, PropertyValue::Const(value))
    }

    /// Append a byte buffer. The list takes ownership of it.
    pub fn add_bytes(&mut self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.push(key, PropertyValue::Bytes(bytes))
    }

    /// Append a string as NUL-terminated bytes. `None` stores an empty
    /// buffer of size 0.
    pub fn add_string(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        let bytes = match value {
            Some(s) => {
                let mut bytes = Vec::new();
                bytes
                    .try_reserve_exact(s.len() + 1)
                    .map_err(|_| Error::OutOfMemory)?;
                bytes.extend_from_slice(s.as_bytes());
                bytes.push(0);
                bytes
            }
            None => Vec::new(),
        };
        self.add_bytes(key, bytes)
    }

    /// Append a complex payload with its type operations.
    pub fn add_complex(
        &mut self,
        key: &str,
        value: ComplexValue,
        ops: Arc<dyn ComplexType>,
    ) -> Result<()> {
        self.push(key, PropertyValue::Complex(value, ops))
    }

    fn push(&mut self, key: &str, value: PropertyValue) -> Result<()> {
        self.props.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        self.props.push(Property {
            key: truncate_key(key).to_owned(),
            value,
        });
        Ok(())
    }

    /// First property whose key matches. Lookup keys are truncated the same
    /// way stored keys are.
    pub fn get(&self, key: &str) -> Result<&Property> {
        let key = truncate_key(key);
        self.props
            .iter()
            .find(|p| p.key == key)
            .ok_or_else(|| Error::not_found(format!("property {key:?}")))
    }

    /// Mutable access to the first property whose key matches.
    pub fn get_mut(&mut self, key: &str) -> Result<&mut Property> {
        let key = truncate_key(key);
        self.props
            .iter_mut()
            .find(|p| p.key == key)
            .ok_or_else(|| Error::not_found(format!("property {key:?}")))
    }

    /// Property at `index` in insertion order.
    pub fn ith(&self, index: usize) -> Result<&Property> {
        self.props.get(index).ok_or_else(|| {
            Error::invalid(format!(
                "property index {index} out of range for list of {}",
                self.props.len()
            ))
        })
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.props.iter()
    }

    /// Replace the contents of `dst` with an independent copy of this list.
    ///
    /// `dst` is cleared first. Bytes are deep-copied and complex payloads go
    /// through [`ComplexType::copy`]. If a copy fails the error is returned
    /// and `dst` keeps the entries copied so far.
    pub fn clone_into(&self, dst: &mut PropertyList) -> Result<()> {
        dst.clear()?;
        dst.props
            .try_reserve(self.props.len())
            .map_err(|_| Error::OutOfMemory)?;
        for prop in &self.props {
            dst.props.push(prop.try_clone()?);
        }
        Ok(())
    }

    /// Independent copy of this list.
    pub fn try_clone(&self) -> Result<PropertyList> {
        let mut dst = PropertyList::new();
        self.clone_into(&mut dst)?;
        Ok(dst)
    }

    /// Release every entry.
    ///
    /// Complex entries are reclaimed in order. The first reclaim failure
    /// stops the pass: later complex entries are dropped without their
    /// reclaim hook and the error is returned.
    pub fn free(mut self) -> Result<()> {
        self.clear()
    }

    fn clear(&mut self) -> Result<()> {
        let mut props = std::mem::take(&mut self.props).into_iter();
        while let Some(mut prop) = props.next() {
            if let PropertyValue::Complex(value, ops) = &mut prop.value {
                if let Err(err) = ops.reclaim(value) {
                    tracing::warn!(
                        key = %prop.key,
                        error = %err,
                        skipped = props.len(),
                        "property reclaim failed, remaining entries not reclaimed"
                    );
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

impl Default for PropertyList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PropertyList {
    fn drop(&mut self) {
        // Failures are already logged by clear().
        let _ = self.clear();
    }
}

impl<'a> IntoIterator for &'a PropertyList {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
