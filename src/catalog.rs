use crate::error::{ExamError, ExamResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Core,
    ScienceElective,
    SocialElective,
}

impl Category {
    pub fn is_elective(self) -> bool {
        !matches!(self, Category::Core)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Core => "core",
            Category::ScienceElective => "science_elective",
            Category::SocialElective => "social_elective",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectDefinition {
    pub name: String,
    pub question_count: u32,
    pub category: Category,
}

impl SubjectDefinition {
    fn new(name: &str, question_count: u32, category: Category) -> Self {
        Self {
            name: name.to_string(),
            question_count,
            category,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogPreset {
    /// Six subjects, 20 questions each, no elective grouping.
    Minimal,
    /// Seventeen subjects with per-subject question counts and
    /// science/social elective groups.
    #[default]
    Extended,
}

const SCIENCE_ELECTIVES: [&str; 4] = ["물리학", "화학", "생명과학", "지구과학"];

const SOCIAL_ELECTIVES: [&str; 9] = [
    "생활과 윤리",
    "윤리와 사상",
    "한국지리",
    "세계지리",
    "동아시아사",
    "세계사",
    "경제",
    "정치와 법",
    "사회·문화",
];

/// Fixed table of subjects for one session. Lookups are by exact name and
/// preserve the declaration order for listings.
#[derive(Debug, Clone)]
pub struct SubjectCatalog {
    subjects: Vec<SubjectDefinition>,
}

impl SubjectCatalog {
    pub fn new(subjects: Vec<SubjectDefinition>) -> ExamResult<Self> {
        if subjects.is_empty() {
            return Err(ExamError::Config("subject catalog is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for s in &subjects {
            if s.name.trim().is_empty() {
                return Err(ExamError::Config("subject name must not be blank".to_string()));
            }
            if s.question_count < 1 {
                return Err(ExamError::Config(format!(
                    "subject {} must have at least one question",
                    s.name
                )));
            }
            if !seen.insert(s.name.as_str()) {
                return Err(ExamError::Config(format!("duplicate subject: {}", s.name)));
            }
        }
        Ok(Self { subjects })
    }

    pub fn preset(preset: CatalogPreset) -> Self {
        let subjects = match preset {
            CatalogPreset::Minimal => preset_minimal(),
            CatalogPreset::Extended => preset_extended(),
        };
        Self { subjects }
    }

    pub fn subjects(&self) -> &[SubjectDefinition] {
        &self.subjects
    }

    pub fn get(&self, subject: &str) -> ExamResult<&SubjectDefinition> {
        self.subjects
            .iter()
            .find(|s| s.name == subject)
            .ok_or_else(|| ExamError::UnknownSubject(subject.to_string()))
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.subjects.iter().any(|s| s.name == subject)
    }

    pub fn question_count(&self, subject: &str) -> ExamResult<u32> {
        Ok(self.get(subject)?.question_count)
    }

    pub fn category(&self, subject: &str) -> ExamResult<Category> {
        Ok(self.get(subject)?.category)
    }

    pub fn is_elective(&self, subject: &str) -> ExamResult<bool> {
        Ok(self.category(subject)?.is_elective())
    }

    pub fn core_subjects(&self) -> Vec<String> {
        self.names_where(|c| !c.is_elective())
    }

    /// Science and social electives combined.
    pub fn elective_subjects(&self) -> Vec<String> {
        self.names_where(Category::is_elective)
    }

    /// Rejects question numbers outside `1..=question_count`.
    pub fn check_question(&self, subject: &str, question_number: u32) -> ExamResult<()> {
        let count = self.question_count(subject)?;
        if question_number < 1 || question_number > count {
            return Err(ExamError::InvalidRow(format!(
                "question {} out of range for {} (1..={})",
                question_number, subject, count
            )));
        }
        Ok(())
    }

    fn names_where(&self, pred: impl Fn(Category) -> bool) -> Vec<String> {
        self.subjects
            .iter()
            .filter(|s| pred(s.category))
            .map(|s| s.name.clone())
            .collect()
    }

    /// Applies overrides on top of this catalog: an override with an existing
    /// name replaces that entry in place, new names are appended.
    pub fn with_overrides(self, overrides: &[SubjectDefinition]) -> ExamResult<Self> {
        let mut subjects = self.subjects;
        for o in overrides {
            match subjects.iter_mut().find(|s| s.name == o.name) {
                Some(existing) => *existing = o.clone(),
                None => subjects.push(o.clone()),
            }
        }
        Self::new(subjects)
    }
}

fn preset_minimal() -> Vec<SubjectDefinition> {
    ["국어", "수학", "영어", "한국사", "탐구1", "탐구2"]
        .iter()
        .map(|name| SubjectDefinition::new(name, 20, Category::Core))
        .collect()
}

fn preset_extended() -> Vec<SubjectDefinition> {
    let mut out = vec![
        SubjectDefinition::new("국어", 45, Category::Core),
        SubjectDefinition::new("수학", 30, Category::Core),
        SubjectDefinition::new("영어", 45, Category::Core),
        SubjectDefinition::new("한국사", 20, Category::Core),
    ];
    // Elective counts are uniform until a config override says otherwise.
    out.extend(
        SCIENCE_ELECTIVES
            .iter()
            .map(|name| SubjectDefinition::new(name, 20, Category::ScienceElective)),
    );
    out.extend(
        SOCIAL_ELECTIVES
            .iter()
            .map(|name| SubjectDefinition::new(name, 20, Category::SocialElective)),
    );
    out
}
