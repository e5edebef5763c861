use crate::models::{Chapter, Project};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Pending,
    InProgress,
    Done,
}

impl ChapterStatus {
    pub fn of(chapter: &Chapter) -> Self {
        if chapter.is_complete() {
            ChapterStatus::Done
        } else if chapter.generating {
            ChapterStatus::InProgress
        } else {
            ChapterStatus::Pending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverStatus {
    Pending,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterProgress {
    pub title: String,
    pub status: ChapterStatus,
}

/// Read-only view of a project during generation, derived on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
    pub chapters: Vec<ChapterProgress>,
    pub cover: CoverStatus,
}

impl Progress {
    pub fn of(project: &Project) -> Self {
        let total = project.chapters.len();
        let completed = project.chapters.iter().filter(|c| c.is_complete()).count();
        Progress {
            completed,
            total,
            percentage: percentage(completed, total),
            chapters: project
                .chapters
                .iter()
                .map(|chapter| ChapterProgress {
                    title: chapter.title.clone(),
                    status: ChapterStatus::of(chapter),
                })
                .collect(),
            cover: if project.cover_image.is_some() {
                CoverStatus::Ready
            } else {
                CoverStatus::Pending
            },
        }
    }

    pub fn in_progress(&self) -> usize {
        self.chapters
            .iter()
            .filter(|c| c.status == ChapterStatus::InProgress)
            .count()
    }
}

/// `round(completed / total * 100)`, half rounding up, 0 for an empty outline.
fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rounded = (completed.min(total) * 200 + total) / (2 * total);
    u8::try_from(rounded).unwrap_or(100)
}
