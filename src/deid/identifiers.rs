//! Identifier and reference pseudonymization
//!
//! Runs after the rules of a resource frame. The resource `id`, every `reference`
//! string and every bundle `fullUrl` are rewritten so that the same source identifier
//! always maps to the same pseudonym. Only the identifier segment of a reference is
//! replaced; prefixes such as a server base URL and `/_history/<v>` suffixes survive.
//! `urn:oid:` references are re-emitted as `urn:uuid:`.

use crate::deid::config::{DeidParameters, IdentifierStrategy};
use crate::deid::crypto::keyed_uuid;
use crate::domain::{DeidError, Node, ProcessingError};
use regex::Regex;
use secrecy::ExposeSecret;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{OnceLock, RwLock};

fn relative_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<prefix>(?:.*/)?)(?P<type>[A-Z][A-Za-z]+)/(?P<id>[A-Za-z0-9\-.]{1,64})(?P<suffix>/_history/[A-Za-z0-9\-.]{1,64})?$",
        )
        .expect("valid reference regex")
    })
}

/// A parsed reference string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceShape<'a> {
    /// `[base/]Type/id[/_history/v]`
    Relative {
        prefix: &'a str,
        resource_type: &'a str,
        id: &'a str,
        suffix: &'a str,
    },
    /// `urn:oid:<id>`
    Oid(&'a str),
    /// `urn:uuid:<id>`
    Uuid(&'a str),
    /// `#<id>`
    Internal(&'a str),
}

impl<'a> ReferenceShape<'a> {
    pub fn parse(reference: &'a str) -> Option<Self> {
        if let Some(id) = reference.strip_prefix('#') {
            return (!id.is_empty()).then_some(ReferenceShape::Internal(id));
        }
        if let Some(id) = reference.strip_prefix("urn:oid:") {
            return (!id.is_empty()).then_some(ReferenceShape::Oid(id));
        }
        if let Some(id) = reference.strip_prefix("urn:uuid:") {
            return (!id.is_empty()).then_some(ReferenceShape::Uuid(id));
        }
        let caps = relative_reference_regex().captures(reference)?;
        Some(ReferenceShape::Relative {
            prefix: caps.name("prefix").map_or("", |m| m.as_str()),
            resource_type: caps.name("type")?.as_str(),
            id: caps.name("id")?.as_str(),
            suffix: caps.name("suffix").map_or("", |m| m.as_str()),
        })
    }

    pub fn id(&self) -> &'a str {
        match self {
            ReferenceShape::Relative { id, .. } => id,
            ReferenceShape::Oid(id) | ReferenceShape::Uuid(id) | ReferenceShape::Internal(id) => id,
        }
    }

    /// Re-renders the reference with a new identifier segment
    pub fn render(&self, new_id: &str) -> String {
        match self {
            ReferenceShape::Relative {
                prefix,
                resource_type,
                suffix,
                ..
            } => format!("{prefix}{resource_type}/{new_id}{suffix}"),
            ReferenceShape::Oid(_) | ReferenceShape::Uuid(_) => format!("urn:uuid:{new_id}"),
            ReferenceShape::Internal(_) => format!("#{new_id}"),
        }
    }
}

/// Persisted id -> pseudonym pairs for the mapping-table strategy
#[derive(Debug, Default)]
pub struct MappingTable {
    pairs: RwLock<HashMap<String, String>>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON object of pairs; a missing file yields an empty table
    pub fn load(path: &Path) -> Result<Self, DeidError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path)?;
        let pairs: HashMap<String, String> = serde_json::from_str(&text)?;
        tracing::info!(path = %path.display(), entries = pairs.len(), "Loaded identifier mapping table");
        Ok(Self {
            pairs: RwLock::new(pairs),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), DeidError> {
        let pairs = self
            .pairs
            .read()
            .map_err(|_| DeidError::Io("identifier mapping table lock poisoned".to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&*pairs)?)?;
        Ok(())
    }

    /// Existing pseudonym for `id`, or a new random one recorded in the table
    pub fn get_or_insert(&self, id: &str) -> Result<String, ProcessingError> {
        let poisoned = || ProcessingError::Crypto("identifier mapping table lock poisoned".to_string());
        if let Some(existing) = self.pairs.read().map_err(|_| poisoned())?.get(id) {
            return Ok(existing.clone());
        }
        let mut pairs = self.pairs.write().map_err(|_| poisoned())?;
        Ok(pairs
            .entry(id.to_string())
            .or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone())
    }

    pub fn len(&self) -> usize {
        self.pairs.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rewrites identifiers with the configured strategy
#[derive(Debug)]
pub struct IdentifierTransformer {
    mapping: Option<MappingTable>,
}

impl IdentifierTransformer {
    /// Builds the transformer, loading the mapping table when that strategy is chosen
    pub fn new(params: &DeidParameters) -> Result<Self, DeidError> {
        let mapping = match params.identifier_strategy {
            IdentifierStrategy::KeyedHash => None,
            IdentifierStrategy::MappingTable => Some(match &params.identifier_mapping_path {
                Some(path) => MappingTable::load(path)?,
                None => MappingTable::new(),
            }),
        };
        Ok(Self { mapping })
    }

    pub fn mapping_table(&self) -> Option<&MappingTable> {
        self.mapping.as_ref()
    }

    /// Pseudonym for one identifier
    pub fn pseudonymize(&self, id: &str, params: &DeidParameters) -> Result<String, ProcessingError> {
        match &self.mapping {
            Some(table) => table.get_or_insert(id),
            None => Ok(keyed_uuid(params.crypto_hash_key.expose_secret().as_bytes(), id)?.to_string()),
        }
    }

    /// Rewritten reference, or `None` when the text matches no reference shape
    pub fn transform_reference(
        &self,
        reference: &str,
        params: &DeidParameters,
    ) -> Result<Option<String>, ProcessingError> {
        match ReferenceShape::parse(reference) {
            Some(shape) => Ok(Some(shape.render(&self.pseudonymize(shape.id(), params)?))),
            None => Ok(None),
        }
    }

    /// Rewrites the identifiers of one resource frame, skipping visited nodes
    ///
    /// Returns the number of values rewritten.
    pub fn apply(
        &self,
        resource: &mut Node,
        visited: &HashSet<String>,
        params: &DeidParameters,
    ) -> Result<usize, ProcessingError> {
        let mut rewritten = 0;
        for child in &mut resource.children {
            if child.name == "id" && !visited.contains(&child.location) {
                if let Some(id) = child.value.as_deref() {
                    child.value = Some(self.pseudonymize(id, params)?);
                    rewritten += 1;
                }
            }
        }
        self.apply_references(resource, visited, params, &mut rewritten)?;
        Ok(rewritten)
    }

    fn apply_references(
        &self,
        node: &mut Node,
        visited: &HashSet<String>,
        params: &DeidParameters,
        rewritten: &mut usize,
    ) -> Result<(), ProcessingError> {
        for child in &mut node.children {
            if child.is_resource() {
                continue;
            }
            let is_reference = child.name == "reference" || child.name == "fullUrl";
            if is_reference && !visited.contains(&child.location) {
                if let Some(value) = child.value.as_deref() {
                    if let Some(new_value) = self.transform_reference(value, params)? {
                        child.value = Some(new_value);
                        *rewritten += 1;
                    }
                }
            }
            self.apply_references(child, visited, params, rewritten)?;
        }
        Ok(())
    }
}
