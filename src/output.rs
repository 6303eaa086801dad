//! Persistence of task and answer sheets.
//!
//! Teachers get one answer sheet per identifier plus the resolved topology;
//! students get the task sheet, and the answers only when allowed.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::error::{Result, ScenarioError};
use crate::scenario::Question;
use crate::topology::TopologyPlan;

/// Task sheet handed to students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDocument {
    pub scenario: String,
    pub task: Vec<String>,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub number: usize,
    pub question: String,
    pub answer: String,
}

/// Answer sheet for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerDocument {
    pub scenario: String,
    pub seed: String,
    pub answers: Vec<Answer>,
}

/// Everything the persist stage writes for one run.
#[derive(Debug, Clone)]
pub struct Documents<'a> {
    pub name: &'a str,
    pub seed: &'a str,
    pub task: TaskDocument,
    pub answers: AnswerDocument,
    pub topology: &'a TopologyPlan,
}

impl<'a> Documents<'a> {
    /// Questions are numbered from 1; statements keep their number but show no answer.
    pub fn new(
        name: &'a str,
        seed: &'a str,
        task: &[String],
        questions: &[Question],
        topology: &'a TopologyPlan,
    ) -> Self {
        let rendered = questions
            .iter()
            .enumerate()
            .map(|(i, q)| {
                if q.is_statement() {
                    q.prompt.clone()
                } else {
                    format!("{}. {}?", i + 1, q.prompt)
                }
            })
            .collect();
        let answers = questions
            .iter()
            .enumerate()
            .filter(|(_, q)| !q.is_statement())
            .map(|(i, q)| Answer {
                number: i + 1,
                question: q.prompt.clone(),
                answer: q.answer.clone(),
            })
            .collect();
        Documents {
            name,
            seed,
            task: TaskDocument {
                scenario: name.to_string(),
                task: task.to_vec(),
                questions: rendered,
            },
            answers: AnswerDocument {
                scenario: name.to_string(),
                seed: seed.to_string(),
                answers,
            },
            topology,
        }
    }
}

/// Where a run's documents end up.
pub trait DocumentSink {
    /// Store `documents`, returning the locations written.
    fn persist(&mut self, documents: &Documents<'_>) -> Result<Vec<PathBuf>>;
}

/// Writes YAML documents into the student and teacher directories.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    pub student_dir: PathBuf,
    pub teacher_dir: PathBuf,
    pub student_allowed_answers: bool,
    pub static_task_document: bool,
}

impl DirectorySink {
    pub fn new(student_dir: impl Into<PathBuf>, teacher_dir: impl Into<PathBuf>) -> Self {
        DirectorySink {
            student_dir: student_dir.into(),
            teacher_dir: teacher_dir.into(),
            student_allowed_answers: false,
            static_task_document: true,
        }
    }
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<PathBuf> {
    let text = serde_yaml::to_string(value)
        .map_err(|e| ScenarioError::Persist(format!("cannot serialize {}: {}", path.display(), e)))?;
    fs::write(path, text).map_err(|e| ScenarioError::Persist(format!("cannot write {}: {}", path.display(), e)))?;
    Ok(path.to_path_buf())
}

impl DocumentSink for DirectorySink {
    fn persist(&mut self, documents: &Documents<'_>) -> Result<Vec<PathBuf>> {
        for dir in [&self.student_dir, &self.teacher_dir] {
            fs::create_dir_all(dir)
                .map_err(|e| ScenarioError::Persist(format!("cannot create {}: {}", dir.display(), e)))?;
        }
        let name = documents.name;
        let seed = documents.seed;
        let mut written = Vec::new();

        written.push(write_yaml(
            &self.teacher_dir.join(format!("{}-{}.yaml", name, seed)),
            &documents.answers,
        )?);
        if self.student_allowed_answers {
            written.push(write_yaml(
                &self.student_dir.join(format!("{}-answers.yaml", name)),
                &documents.answers,
            )?);
        }
        if self.static_task_document {
            written.push(write_yaml(&self.teacher_dir.join(format!("{}.yaml", name)), &documents.task)?);
        }
        written.push(write_yaml(&self.student_dir.join(format!("{}.yaml", name)), &documents.task)?);

        let topology_path = self.teacher_dir.join(format!("{}-{}.topology.json", name, seed));
        let topology = serde_json::to_string_pretty(documents.topology)
            .map_err(|e| ScenarioError::Persist(format!("cannot serialize topology: {}", e)))?;
        fs::write(&topology_path, topology)
            .map_err(|e| ScenarioError::Persist(format!("cannot write {}: {}", topology_path.display(), e)))?;
        written.push(topology_path);

        info!("Saved {} documents for {} ({})", written.len(), name, seed);
        Ok(written)
    }
}

/// Keeps documents in memory; used for dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    documents: Vec<(TaskDocument, AnswerDocument)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> &[(TaskDocument, AnswerDocument)] {
        &self.documents
    }
}

impl DocumentSink for MemorySink {
    fn persist(&mut self, documents: &Documents<'_>) -> Result<Vec<PathBuf>> {
        self.documents.push((documents.task.clone(), documents.answers.clone()));
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn questions() -> Vec<Question> {
        vec![
            Question::statement("Open wireshark"),
            Question::ask("What port is being used", "21"),
        ]
    }

    #[test]
    fn test_numbering_and_statements() {
        let plan = TopologyPlan::default();
        let docs = Documents::new("Test", "42", &["Test".to_string()], &questions(), &plan);
        assert_eq!(docs.task.questions, vec!["Open wireshark", "2. What port is being used?"]);
        assert_eq!(docs.answers.answers.len(), 1);
        assert_eq!(docs.answers.answers[0].number, 2);
        assert_eq!(docs.answers.answers[0].answer, "21");
    }

    #[test]
    fn test_directory_layout() {
        let root = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(root.path().join("student"), root.path().join("teacher"));
        let plan = TopologyPlan::default();
        let docs = Documents::new("Test", "42", &[], &questions(), &plan);
        let written = sink.persist(&docs).unwrap();

        assert_eq!(written.len(), 4);
        assert!(root.path().join("teacher/Test-42.yaml").exists());
        assert!(root.path().join("teacher/Test.yaml").exists());
        assert!(root.path().join("student/Test.yaml").exists());
        assert!(root.path().join("teacher/Test-42.topology.json").exists());
        assert!(!root.path().join("student/Test-answers.yaml").exists());

        let answers = fs::read_to_string(root.path().join("teacher/Test-42.yaml")).unwrap();
        assert!(answers.contains("seed: '42'"));
    }

    #[test]
    fn test_students_may_see_answers() {
        let root = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(root.path().join("student"), root.path().join("teacher"));
        sink.student_allowed_answers = true;
        sink.static_task_document = false;
        let plan = TopologyPlan::default();
        let docs = Documents::new("Test", "random", &[], &questions(), &plan);
        sink.persist(&docs).unwrap();

        assert!(root.path().join("student/Test-answers.yaml").exists());
        assert!(!root.path().join("teacher/Test.yaml").exists());
    }
}
