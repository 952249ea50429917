//! Built-in attribute dictionary
//!
//! Covers the identifying attributes rules are usually written against, plus the
//! attributes the engine itself writes. Rules may use these keywords instead of
//! numeric tags.

use crate::domain::Tag;

/// One dictionary entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub keyword: &'static str,
    pub tag: Tag,
    pub vr: &'static str,
}

const fn entry(keyword: &'static str, group: u16, element: u16, vr: &'static str) -> DictionaryEntry {
    DictionaryEntry {
        keyword,
        tag: Tag::new(group, element),
        vr,
    }
}

const ENTRIES: &[DictionaryEntry] = &[
    entry("SOPInstanceUID", 0x0008, 0x0018, "UI"),
    entry("StudyDate", 0x0008, 0x0020, "DA"),
    entry("SeriesDate", 0x0008, 0x0021, "DA"),
    entry("AcquisitionDate", 0x0008, 0x0022, "DA"),
    entry("ContentDate", 0x0008, 0x0023, "DA"),
    entry("AcquisitionDateTime", 0x0008, 0x002A, "DT"),
    entry("StudyTime", 0x0008, 0x0030, "TM"),
    entry("AccessionNumber", 0x0008, 0x0050, "SH"),
    entry("InstitutionName", 0x0008, 0x0080, "LO"),
    entry("InstitutionAddress", 0x0008, 0x0081, "ST"),
    entry("ReferringPhysicianName", 0x0008, 0x0090, "PN"),
    entry("ReferringPhysicianAddress", 0x0008, 0x0092, "ST"),
    entry("ReferringPhysicianTelephoneNumbers", 0x0008, 0x0094, "SH"),
    entry("StationName", 0x0008, 0x1010, "SH"),
    entry("StudyDescription", 0x0008, 0x1030, "LO"),
    entry("InstitutionalDepartmentName", 0x0008, 0x1040, "LO"),
    entry("PerformingPhysicianName", 0x0008, 0x1050, "PN"),
    entry("OperatorsName", 0x0008, 0x1070, "PN"),
    entry("PatientName", 0x0010, 0x0010, "PN"),
    entry("PatientID", 0x0010, 0x0020, "LO"),
    entry("IssuerOfPatientID", 0x0010, 0x0021, "LO"),
    entry("PatientBirthDate", 0x0010, 0x0030, "DA"),
    entry("PatientBirthTime", 0x0010, 0x0032, "TM"),
    entry("PatientSex", 0x0010, 0x0040, "CS"),
    entry("OtherPatientIDs", 0x0010, 0x1000, "LO"),
    entry("OtherPatientNames", 0x0010, 0x1001, "PN"),
    entry("PatientAge", 0x0010, 0x1010, "AS"),
    entry("PatientSize", 0x0010, 0x1020, "DS"),
    entry("PatientWeight", 0x0010, 0x1030, "DS"),
    entry("PatientAddress", 0x0010, 0x1040, "LO"),
    entry("PatientMotherBirthName", 0x0010, 0x1060, "PN"),
    entry("PatientTelephoneNumbers", 0x0010, 0x2154, "SH"),
    entry("EthnicGroup", 0x0010, 0x2160, "SH"),
    entry("PatientComments", 0x0010, 0x4000, "LT"),
    entry("PatientIdentityRemoved", 0x0012, 0x0062, "CS"),
    entry("DeidentificationMethod", 0x0012, 0x0063, "LO"),
    entry("DeviceSerialNumber", 0x0018, 0x1000, "LO"),
    entry("StudyInstanceUID", 0x0020, 0x000D, "UI"),
    entry("SeriesInstanceUID", 0x0020, 0x000E, "UI"),
    entry("StudyID", 0x0020, 0x0010, "SH"),
    entry("FrameOfReferenceUID", 0x0020, 0x0052, "UI"),
    entry("RequestingPhysician", 0x0032, 0x1032, "PN"),
];

/// Entry for a keyword, case-sensitive
pub fn by_keyword(keyword: &str) -> Option<&'static DictionaryEntry> {
    ENTRIES.iter().find(|e| e.keyword == keyword)
}

/// Entry for a tag
pub fn by_tag(tag: Tag) -> Option<&'static DictionaryEntry> {
    ENTRIES.iter().find(|e| e.tag == tag)
}

/// Dictionary VR for a tag
pub fn vr_of(tag: Tag) -> Option<&'static str> {
    by_tag(tag).map(|e| e.vr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_ways() {
        let entry = by_keyword("PatientBirthDate").unwrap();
        assert_eq!(entry.tag, Tag::new(0x0010, 0x0030));
        assert_eq!(by_tag(entry.tag).unwrap().keyword, "PatientBirthDate");
        assert_eq!(vr_of(Tag::new(0x0020, 0x000D)), Some("UI"));
        assert!(by_keyword("patientname").is_none());
    }

    #[test]
    fn test_no_duplicate_tags() {
        for (i, a) in ENTRIES.iter().enumerate() {
            for b in &ENTRIES[i + 1..] {
                assert_ne!(a.tag, b.tag, "{} and {}", a.keyword, b.keyword);
            }
        }
    }
}
