//! Process results and the security labels derived from them

use crate::domain::{Node, Tag};
use serde::{Deserialize, Serialize};

/// Code system of the security labels attached to path-family resources
pub const SECURITY_LABEL_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ObservationValue";

/// `PatientIdentityRemoved`
pub const PATIENT_IDENTITY_REMOVED: Tag = Tag::new(0x0012, 0x0062);
/// `DeidentificationMethod`
pub const DEIDENTIFICATION_METHOD: Tag = Tag::new(0x0012, 0x0063);

/// Effect flags produced by processors and folded per resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub redacted: bool,
    pub abstracted: bool,
    pub perturbed: bool,
    pub substituted: bool,
    pub crypto_hashed: bool,
    pub encrypted: bool,
}

impl ProcessResult {
    pub fn redacted() -> Self {
        Self {
            redacted: true,
            ..Self::default()
        }
    }

    pub fn abstracted() -> Self {
        Self {
            abstracted: true,
            ..Self::default()
        }
    }

    pub fn perturbed() -> Self {
        Self {
            perturbed: true,
            ..Self::default()
        }
    }

    pub fn substituted() -> Self {
        Self {
            substituted: true,
            ..Self::default()
        }
    }

    pub fn crypto_hashed() -> Self {
        Self {
            crypto_hashed: true,
            ..Self::default()
        }
    }

    pub fn encrypted() -> Self {
        Self {
            encrypted: true,
            ..Self::default()
        }
    }

    /// Folds another result into this one
    pub fn merge(&mut self, other: &ProcessResult) {
        self.redacted |= other.redacted;
        self.abstracted |= other.abstracted;
        self.perturbed |= other.perturbed;
        self.substituted |= other.substituted;
        self.crypto_hashed |= other.crypto_hashed;
        self.encrypted |= other.encrypted;
    }

    /// True when no flag is set
    pub fn is_empty(&self) -> bool {
        self.labels().is_empty()
    }

    /// Labels for every set flag, in a fixed order
    pub fn labels(&self) -> Vec<SecurityLabel> {
        let mut labels = Vec::new();
        if self.redacted {
            labels.push(SecurityLabel::Redacted);
        }
        if self.abstracted {
            labels.push(SecurityLabel::Abstracted);
        }
        if self.perturbed {
            labels.push(SecurityLabel::Perturbed);
        }
        if self.substituted {
            labels.push(SecurityLabel::Substituted);
        }
        if self.crypto_hashed {
            labels.push(SecurityLabel::CryptoHashed);
        }
        if self.encrypted {
            labels.push(SecurityLabel::Masked);
        }
        labels
    }
}

/// Machine-readable "altered by" label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLabel {
    Redacted,
    Abstracted,
    Perturbed,
    Substituted,
    CryptoHashed,
    Masked,
}

impl SecurityLabel {
    pub fn code(&self) -> &'static str {
        match self {
            SecurityLabel::Redacted => "REDACTED",
            SecurityLabel::Abstracted => "ABSTRED",
            SecurityLabel::Perturbed => "PERTURBED",
            SecurityLabel::Substituted => "SUBSTITUTED",
            SecurityLabel::CryptoHashed => "CRYTOHASH",
            SecurityLabel::Masked => "MASKED",
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            SecurityLabel::Redacted => "redacted",
            SecurityLabel::Abstracted => "abstracted",
            SecurityLabel::Perturbed => "exact value is replaced with another exact value",
            SecurityLabel::Substituted => "exact value is replaced with a predefined value",
            SecurityLabel::CryptoHashed => "cryptographic hash function",
            SecurityLabel::Masked => "masked",
        }
    }
}

/// Adds missing labels to `meta.security` of a path-family resource root
///
/// Existing codings with the same system and code are left alone. Returns the index
/// of the `meta` child when anything was attached.
pub fn attach_path_labels(resource: &mut Node, result: &ProcessResult) -> Option<usize> {
    let labels = result.labels();
    if labels.is_empty() {
        return None;
    }

    let meta_idx = match resource.children.iter().position(|c| c.name == "meta") {
        Some(idx) => idx,
        None => {
            resource.push_child(Node::element("meta", "Meta"));
            resource.children.len() - 1
        }
    };
    let meta = &mut resource.children[meta_idx];

    for label in labels {
        let present = meta.children_named("security").any(|coding| {
            coding.child_value("system") == Some(SECURITY_LABEL_SYSTEM)
                && coding.child_value("code") == Some(label.code())
        });
        if present {
            continue;
        }
        meta.push_child(
            Node::element("security", "Coding")
                .as_repeated()
                .with_child(Node::leaf("system", "uri", SECURITY_LABEL_SYSTEM))
                .with_child(Node::leaf("code", "code", label.code()))
                .with_child(Node::leaf("display", "string", label.display())),
        );
    }
    Some(meta_idx)
}

/// Sets `PatientIdentityRemoved` and appends label codes to `DeidentificationMethod`
///
/// Returns the indices of the two attributes.
pub fn attach_tag_labels(dataset: &mut Node, result: &ProcessResult) -> Vec<usize> {
    let labels = result.labels();
    if labels.is_empty() {
        return Vec::new();
    }

    let removed_idx = upsert_element(dataset, PATIENT_IDENTITY_REMOVED, "CS");
    dataset.children[removed_idx].value = Some("YES".to_string());

    let method_idx = upsert_element(dataset, DEIDENTIFICATION_METHOD, "LO");
    let method = &mut dataset.children[method_idx];
    let mut codes: Vec<String> = method
        .value
        .as_deref()
        .map(|v| v.split('\\').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    for label in labels {
        if !codes.iter().any(|c| c == label.code()) {
            codes.push(label.code().to_string());
        }
    }
    method.value = Some(codes.join("\\"));

    vec![removed_idx, method_idx]
}

fn upsert_element(dataset: &mut Node, tag: Tag, vr: &str) -> usize {
    let name = tag.to_string();
    if let Some(idx) = dataset.children.iter().position(|c| c.name == name) {
        return idx;
    }
    dataset.push_child(Node::element(name, vr));
    dataset.children.len() - 1
}
