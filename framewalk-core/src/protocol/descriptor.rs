//! Protocol descriptors.

use std::fmt;
use std::sync::Arc;

use super::Binding;
use crate::dissect::SubHeaderMap;
use crate::flow::KeyField;

/// Resolves a header's length from `(buffer, header_offset)`.
///
/// `None` or `Some(0)` marks the header as malformed.
pub type LengthFn = Arc<dyn Fn(&[u8], usize) -> Option<usize> + Send + Sync>;

/// Fills the sub-header map from the header's own bytes.
///
/// Entries that do not fit the map are skipped by the decoder.
pub type SubHeaderDecoder = fn(header: &[u8], map: &mut SubHeaderMap);

/// How a header's length is determined.
#[derive(Clone)]
pub enum HeaderLength {
    Static(usize),
    Dynamic(LengthFn),
}

impl fmt::Debug for HeaderLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderLength::Static(n) => f.debug_tuple("Static").field(n).finish(),
            HeaderLength::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// Which native behaviors have been replaced by overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overrides {
    pub length: bool,
    pub bindings: bool,
}

/// Registered metadata for one header type.
#[derive(Clone)]
pub struct ProtocolDescriptor {
    name: &'static str,
    display_name: &'static str,
    length: HeaderLength,
    length_override: Option<LengthFn>,
    bindings: Vec<Binding>,
    override_bindings: Vec<Binding>,
    overrides: Overrides,
    key_fields: Vec<KeyField>,
    sub_headers: Option<SubHeaderDecoder>,
}

impl ProtocolDescriptor {
    /// Descriptor for a header of constant size.
    pub fn fixed(name: &'static str, length: usize) -> Self {
        Self::from_length(name, HeaderLength::Static(length))
    }

    /// Descriptor whose length is computed from the packet bytes.
    pub fn dynamic<F>(name: &'static str, length: F) -> Self
    where
        F: Fn(&[u8], usize) -> Option<usize> + Send + Sync + 'static,
    {
        Self::from_length(name, HeaderLength::Dynamic(Arc::new(length)))
    }

    fn from_length(name: &'static str, length: HeaderLength) -> Self {
        Self {
            name,
            display_name: name,
            length,
            length_override: None,
            bindings: Vec::new(),
            override_bindings: Vec::new(),
            overrides: Overrides::default(),
            key_fields: Vec::new(),
            sub_headers: None,
        }
    }

    pub fn with_display_name(mut self, display_name: &'static str) -> Self {
        self.display_name = display_name;
        self
    }

    /// Add a flow key field. Fields stay ordered by pair index.
    pub fn key_field(mut self, field: KeyField) -> Self {
        let pos = self.key_fields.partition_point(|f| f.pair <= field.pair);
        self.key_fields.insert(pos, field);
        self
    }

    pub fn sub_header_decoder(mut self, decoder: SubHeaderDecoder) -> Self {
        self.sub_headers = Some(decoder);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn display_name(&self) -> &'static str {
        self.display_name
    }

    pub fn length(&self) -> &HeaderLength {
        &self.length
    }

    pub fn overrides(&self) -> Overrides {
        self.overrides
    }

    pub fn key_fields(&self) -> &[KeyField] {
        &self.key_fields
    }

    pub fn sub_headers(&self) -> Option<SubHeaderDecoder> {
        self.sub_headers
    }

    /// Resolve the header length at `offset`.
    ///
    /// An overriding length function wins over the static length, which
    /// wins over the native function.
    pub fn resolve_length(&self, buf: &[u8], offset: usize) -> Option<usize> {
        if let Some(length) = &self.length_override {
            return length(buf, offset);
        }
        match &self.length {
            HeaderLength::Static(n) => Some(*n),
            HeaderLength::Dynamic(length) => length(buf, offset),
        }
    }

    /// The bindings consulted by the dissector, in registration order.
    ///
    /// Once any override binding exists, the native ones are ignored.
    pub fn active_bindings(&self) -> &[Binding] {
        if self.overrides.bindings {
            &self.override_bindings
        } else {
            &self.bindings
        }
    }

    /// Native bindings regardless of overrides.
    pub fn native_bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub(crate) fn push_binding(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    pub(crate) fn push_override_binding(&mut self, binding: Binding) {
        self.override_bindings.push(binding);
        self.overrides.bindings = true;
    }

    pub(crate) fn set_length_override(&mut self, length: LengthFn) {
        self.length_override = Some(length);
        self.overrides.length = true;
    }
}

impl fmt::Debug for ProtocolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolDescriptor")
            .field("name", &self.name)
            .field("length", &self.length)
            .field("overrides", &self.overrides)
            .field("bindings", &self.bindings.len())
            .field("override_bindings", &self.override_bindings.len())
            .field("key_fields", &self.key_fields)
            .finish_non_exhaustive()
    }
}
