use serde::{Deserialize, Serialize};

/// Selectable names when a grade uses the standard naming scheme, in
/// render order.
pub const STANDARD_SECTION_NAMES: [&str; 7] = ["A", "B", "C", "D", "E", "F", "G"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Standard,
    Custom,
}

impl SectionType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Custom => "custom",
        }
    }
}

fn standard_rank(name: &str) -> Option<usize> {
    STANDARD_SECTION_NAMES.iter().position(|n| *n == name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionEntry {
    pub id: i64,
    pub name: String,
    pub is_new: bool,
}

impl SectionEntry {
    pub fn added(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            is_new: true,
        }
    }

    pub fn persisted(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_new: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacultySectionGroup {
    pub faculty_id: i64,
    pub sections: Vec<SectionEntry>,
}

#[derive(Debug, Clone)]
pub struct SectionDraft {
    pub has_faculties: bool,
    pub section_type: SectionType,
    pub sections: Vec<SectionEntry>,
    pub faculty_sections: Vec<FacultySectionGroup>,
}

impl SectionDraft {
    fn empty() -> Self {
        Self {
            has_faculties: false,
            section_type: SectionType::Standard,
            sections: Vec::new(),
            faculty_sections: Vec::new(),
        }
    }
}

/// A faculty as captured from the catalog when the form session opened.
#[derive(Debug, Clone)]
pub struct FacultyRef {
    pub id: i64,
    pub name: String,
}

/// A section row as it exists in the database, used to hydrate an edit
/// session.
#[derive(Debug, Clone)]
pub struct PersistedSection {
    pub id: i64,
    pub faculty_id: Option<i64>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Normalized payload the composer hands to the parent form. This is also
/// the shape `grades.create`/`grades.update` accept back for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionData {
    pub has_faculties: bool,
    pub section_type: String,
    #[serde(default)]
    pub sections: Vec<SectionEntry>,
    #[serde(default)]
    pub faculty_sections: Vec<FacultySectionData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultySectionData {
    pub faculty_id: i64,
    #[serde(default)]
    pub faculty_name: Option<String>,
    #[serde(default)]
    pub sections: Vec<SectionEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeView {
    pub value: String,
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardCellView {
    pub name: String,
    pub checked: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEntryView {
    pub index: usize,
    pub name: String,
    pub editable: bool,
    pub removable: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRowView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_cells: Option<Vec<StandardCellView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_entries: Option<Vec<CustomEntryView>>,
    pub can_add: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyRowView {
    pub faculty_id: i64,
    pub faculty_name: String,
    pub checked: bool,
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<SectionRowView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftView {
    pub has_faculties: ModeView,
    pub section_type: ModeView,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub faculty_rows: Vec<FacultyRowView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general_row: Option<SectionRowView>,
}

/// One open grade form's transient section composition. Lives only in the
/// daemon's draft registry; discarded whole, never partially persisted.
pub struct DraftSession {
    pub grade_id: Option<i64>,
    pub locked: bool,
    pub faculties: Vec<FacultyRef>,
    draft: SectionDraft,
}

impl DraftSession {
    pub fn fresh(faculties: Vec<FacultyRef>) -> Self {
        Self {
            grade_id: None,
            locked: false,
            faculties,
            draft: SectionDraft::empty(),
        }
    }

    /// Hydrate from a persisted grade. Entries arrive in section sort
    /// order; groups come out in catalog order. The session locks as soon
    /// as the grade has any persisted section.
    pub fn for_edit(
        grade_id: i64,
        has_faculties: bool,
        section_type: SectionType,
        persisted: &[PersistedSection],
        faculties: Vec<FacultyRef>,
    ) -> Self {
        let mut draft = SectionDraft::empty();
        draft.has_faculties = has_faculties;
        draft.section_type = section_type;

        if has_faculties {
            for f in &faculties {
                let sections: Vec<SectionEntry> = persisted
                    .iter()
                    .filter(|s| s.faculty_id == Some(f.id))
                    .map(|s| SectionEntry::persisted(s.id, s.name.clone()))
                    .collect();
                if !sections.is_empty() {
                    draft.faculty_sections.push(FacultySectionGroup {
                        faculty_id: f.id,
                        sections,
                    });
                }
            }
        } else {
            draft.sections = persisted
                .iter()
                .filter(|s| s.faculty_id.is_none())
                .map(|s| SectionEntry::persisted(s.id, s.name.clone()))
                .collect();
        }

        Self {
            grade_id: Some(grade_id),
            locked: !persisted.is_empty(),
            faculties,
            draft,
        }
    }

    pub fn draft(&self) -> &SectionDraft {
        &self.draft
    }

    fn faculty_name(&self, faculty_id: i64) -> Option<&str> {
        self.faculties
            .iter()
            .find(|f| f.id == faculty_id)
            .map(|f| f.name.as_str())
    }

    fn group(&self, faculty_id: i64) -> Option<&FacultySectionGroup> {
        self.draft
            .faculty_sections
            .iter()
            .find(|g| g.faculty_id == faculty_id)
    }

    /// The list an operation targets: the flat list in no-faculty mode,
    /// the matching group's list otherwise. None when the scope does not
    /// exist in the current draft.
    fn scope(&self, faculty_id: Option<i64>) -> Option<&Vec<SectionEntry>> {
        match (self.draft.has_faculties, faculty_id) {
            (false, None) => Some(&self.draft.sections),
            (true, Some(fid)) => self.group(fid).map(|g| &g.sections),
            _ => None,
        }
    }

    fn replace_scope(&mut self, faculty_id: Option<i64>, next: Vec<SectionEntry>) {
        match (self.draft.has_faculties, faculty_id) {
            (false, None) => self.draft.sections = next,
            (true, Some(fid)) => {
                self.draft.faculty_sections = self
                    .draft
                    .faculty_sections
                    .iter()
                    .map(|g| {
                        if g.faculty_id == fid {
                            FacultySectionGroup {
                                faculty_id: fid,
                                sections: next.clone(),
                            }
                        } else {
                            g.clone()
                        }
                    })
                    .collect();
            }
            _ => {}
        }
    }

    pub fn set_has_faculties(&mut self, value: bool) -> bool {
        if self.locked || self.draft.has_faculties == value {
            return false;
        }
        self.draft.has_faculties = value;
        self.draft.sections = Vec::new();
        self.draft.faculty_sections = Vec::new();
        true
    }

    pub fn set_section_type(&mut self, value: SectionType) -> bool {
        if self.locked || self.draft.section_type == value {
            return false;
        }
        self.draft.section_type = value;
        // The session is unlocked, so every entry is new; a naming-scheme
        // switch starts the lists over but keeps faculty membership.
        self.draft.sections = Vec::new();
        self.draft.faculty_sections = self
            .draft
            .faculty_sections
            .iter()
            .map(|g| FacultySectionGroup {
                faculty_id: g.faculty_id,
                sections: Vec::new(),
            })
            .collect();
        true
    }

    pub fn toggle_faculty(&mut self, faculty_id: i64, checked: bool) -> bool {
        if !self.draft.has_faculties || self.faculty_name(faculty_id).is_none() {
            return false;
        }
        let present = self.group(faculty_id).is_some();
        if checked {
            if present {
                return false;
            }
            let mut next = self.draft.faculty_sections.clone();
            next.push(FacultySectionGroup {
                faculty_id,
                sections: Vec::new(),
            });
            self.draft.faculty_sections = next;
            return true;
        }
        let Some(group) = self.group(faculty_id) else {
            return false;
        };
        // A faculty with persisted sections cannot be dropped.
        if group.sections.iter().any(|s| !s.is_new) {
            return false;
        }
        self.draft.faculty_sections = self
            .draft
            .faculty_sections
            .iter()
            .filter(|g| g.faculty_id != faculty_id)
            .cloned()
            .collect();
        true
    }

    pub fn toggle_standard_section(
        &mut self,
        faculty_id: Option<i64>,
        name: &str,
        checked: bool,
    ) -> bool {
        if self.draft.section_type != SectionType::Standard || standard_rank(name).is_none() {
            return false;
        }
        let Some(list) = self.scope(faculty_id) else {
            return false;
        };
        let existing = list.iter().find(|e| e.name == name);
        if checked {
            if existing.is_some() {
                return false;
            }
            let mut next = list.clone();
            next.push(SectionEntry::added(name));
            next.sort_by_key(|e| standard_rank(&e.name).unwrap_or(usize::MAX));
            self.replace_scope(faculty_id, next);
            return true;
        }
        match existing {
            // Persisted sections cannot be unchecked.
            Some(e) if e.is_new => {
                let next = list.iter().filter(|e| e.name != name).cloned().collect();
                self.replace_scope(faculty_id, next);
                true
            }
            _ => false,
        }
    }

    pub fn add_custom_section(&mut self, faculty_id: Option<i64>) -> bool {
        if self.draft.section_type != SectionType::Custom {
            return false;
        }
        let Some(list) = self.scope(faculty_id) else {
            return false;
        };
        let mut next = list.clone();
        next.push(SectionEntry::added(""));
        self.replace_scope(faculty_id, next);
        true
    }

    pub fn rename_custom_section(
        &mut self,
        faculty_id: Option<i64>,
        index: usize,
        value: &str,
    ) -> bool {
        if self.draft.section_type != SectionType::Custom {
            return false;
        }
        let Some(list) = self.scope(faculty_id) else {
            return false;
        };
        // Persisted sections keep their saved name for the whole session.
        match list.get(index) {
            Some(e) if e.is_new && e.name != value => {}
            _ => return false,
        }
        let next: Vec<SectionEntry> = list
            .iter()
            .enumerate()
            .map(|(i, e)| {
                if i == index {
                    SectionEntry {
                        id: e.id,
                        name: value.to_string(),
                        is_new: e.is_new,
                    }
                } else {
                    e.clone()
                }
            })
            .collect();
        self.replace_scope(faculty_id, next);
        true
    }

    pub fn remove_custom_section(&mut self, faculty_id: Option<i64>, index: usize) -> bool {
        if self.draft.section_type != SectionType::Custom {
            return false;
        }
        let Some(list) = self.scope(faculty_id) else {
            return false;
        };
        match list.get(index) {
            Some(e) if e.is_new => {}
            _ => return false,
        }
        let next: Vec<SectionEntry> = list
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, e)| e.clone())
            .collect();
        self.replace_scope(faculty_id, next);
        true
    }

    pub fn validate(&self) -> Validation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.draft.has_faculties {
            if self.draft.faculty_sections.is_empty() {
                errors.push("select at least one faculty".to_string());
            }
            for g in &self.draft.faculty_sections {
                let scope = self
                    .faculty_name(g.faculty_id)
                    .unwrap_or("faculty")
                    .to_string();
                collect_name_warnings(&g.sections, &scope, &mut warnings);
            }
        } else if self.draft.sections.is_empty() {
            errors.push("add at least one section".to_string());
        } else {
            collect_name_warnings(&self.draft.sections, "sections", &mut warnings);
        }

        Validation {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// The payload handed upward after every mutation: normalized section
    /// data plus the current validity.
    pub fn emit(&self) -> (SectionData, Validation) {
        let data = SectionData {
            has_faculties: self.draft.has_faculties,
            section_type: self.draft.section_type.key().to_string(),
            sections: if self.draft.has_faculties {
                Vec::new()
            } else {
                self.draft.sections.clone()
            },
            faculty_sections: if self.draft.has_faculties {
                self.draft
                    .faculty_sections
                    .iter()
                    .map(|g| FacultySectionData {
                        faculty_id: g.faculty_id,
                        faculty_name: self.faculty_name(g.faculty_id).map(|s| s.to_string()),
                        sections: g.sections.clone(),
                    })
                    .collect()
            } else {
                Vec::new()
            },
        };
        (data, self.validate())
    }

    /// Pure render model: flags only, no mutation and no catalog access
    /// beyond the snapshot taken at open time.
    pub fn view(&self) -> DraftView {
        let faculty_rows = if self.draft.has_faculties {
            self.faculties
                .iter()
                .map(|f| {
                    let group = self.group(f.id);
                    FacultyRowView {
                        faculty_id: f.id,
                        faculty_name: f.name.clone(),
                        checked: group.is_some(),
                        disabled: group
                            .map(|g| g.sections.iter().any(|s| !s.is_new))
                            .unwrap_or(false),
                        row: group.map(|g| self.section_row(&g.sections)),
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        DraftView {
            has_faculties: ModeView {
                value: if self.draft.has_faculties {
                    "faculties".to_string()
                } else {
                    "general".to_string()
                },
                locked: self.locked,
            },
            section_type: ModeView {
                value: self.draft.section_type.key().to_string(),
                locked: self.locked,
            },
            faculty_rows,
            general_row: if self.draft.has_faculties {
                None
            } else {
                Some(self.section_row(&self.draft.sections))
            },
        }
    }

    fn section_row(&self, sections: &[SectionEntry]) -> SectionRowView {
        match self.draft.section_type {
            SectionType::Standard => SectionRowView {
                standard_cells: Some(
                    STANDARD_SECTION_NAMES
                        .iter()
                        .map(|name| {
                            let entry = sections.iter().find(|e| e.name == *name);
                            StandardCellView {
                                name: name.to_string(),
                                checked: entry.is_some(),
                                disabled: entry.map(|e| !e.is_new).unwrap_or(false),
                            }
                        })
                        .collect(),
                ),
                custom_entries: None,
                can_add: false,
            },
            SectionType::Custom => SectionRowView {
                standard_cells: None,
                custom_entries: Some(
                    sections
                        .iter()
                        .enumerate()
                        .map(|(index, e)| CustomEntryView {
                            index,
                            name: e.name.clone(),
                            editable: e.is_new,
                            removable: e.is_new,
                        })
                        .collect(),
                ),
                can_add: true,
            },
        }
    }
}

fn collect_name_warnings(sections: &[SectionEntry], scope: &str, warnings: &mut Vec<String>) {
    let mut seen: Vec<&str> = Vec::new();
    for e in sections {
        let name = e.name.trim();
        if name.is_empty() {
            warnings.push(format!("blank section name in {}", scope));
            continue;
        }
        if seen.contains(&name) {
            warnings.push(format!("duplicate section name \"{}\" in {}", name, scope));
        } else {
            seen.push(name);
        }
    }
}
