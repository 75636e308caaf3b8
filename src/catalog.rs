//! Administrative edits to the image collection.
//!
//! Every operation reads the whole collection, changes it, and writes it back
//! through [`ImageRepository::set`]. The scheduler sees the result on its next
//! poll.

use signage_model::{ClockTime, DayToken, DisplaySchedule, ExpiryDate, Image};
use thiserror::Error;
use tracing::info;

use crate::repository::{ImageRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum CatalogError {
    /// No stored record carries the requested id.
    #[error("no image with id {0}")]
    UnknownImage(u64),

    /// The draft failed validation; nothing was written.
    #[error("invalid image: {0}")]
    Invalid(String),

    /// The collection could not be read in full or written back.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Everything an administrator supplies for an image; the id is assigned by
/// the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDraft {
    pub url: String,
    /// Kept as stored so an unreadable value is never silently dropped.
    pub expiry_date: Option<ExpiryDate>,
    pub start_time: String,
    pub end_time: String,
    pub every_day: bool,
    pub repeat_days: Vec<String>,
    pub duration_sec: i64,
}

impl Default for ImageDraft {
    fn default() -> Self {
        Self {
            url: String::new(),
            expiry_date: None,
            start_time: "08:00".to_string(),
            end_time: "20:00".to_string(),
            every_day: false,
            repeat_days: Vec::new(),
            duration_sec: 10,
        }
    }
}

impl ImageDraft {
    /// Starting point for editing an existing record.
    pub fn from_image(image: &Image) -> Self {
        let schedule = &image.display_schedule;
        Self {
            url: image.url.clone(),
            expiry_date: image.expiry_date.clone(),
            start_time: schedule.start_time.to_string(),
            end_time: schedule.end_time.to_string(),
            every_day: schedule.every_day,
            repeat_days: schedule.repeat_days.iter().map(ToString::to_string).collect(),
            duration_sec: schedule.duration_sec,
        }
    }

    fn into_image(self, id: u64) -> Result<Image, CatalogError> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Err(CatalogError::Invalid("url must not be blank".into()));
        }
        if self.duration_sec <= 0 {
            return Err(CatalogError::Invalid(format!(
                "duration must be positive (got {})",
                self.duration_sec
            )));
        }
        if let Some(ExpiryDate::Malformed(raw)) = &self.expiry_date {
            return Err(CatalogError::Invalid(format!(
                "stored expiry date '{raw}' is not YYYY-MM-DD; replace or clear it"
            )));
        }
        let start_time = parse_time("start time", &self.start_time)?;
        let end_time = parse_time("end time", &self.end_time)?;
        if start_time.time() > end_time.time() {
            return Err(CatalogError::Invalid(format!(
                "window {start_time}-{end_time} ends before it starts"
            )));
        }

        let mut repeat_days: Vec<DayToken> = Vec::new();
        for raw in &self.repeat_days {
            let token = DayToken::parse(raw.trim());
            if let DayToken::Unknown(unknown) = &token {
                return Err(CatalogError::Invalid(format!(
                    "unknown weekday '{unknown}' (expected Sun, Mon, Tue, Wed, Thu, Fri, Sat)"
                )));
            }
            if !repeat_days.contains(&token) {
                repeat_days.push(token);
            }
        }

        Ok(Image {
            id,
            url,
            expiry_date: self.expiry_date,
            display_schedule: DisplaySchedule {
                start_time,
                end_time,
                repeat_days,
                every_day: self.every_day,
                duration_sec: self.duration_sec,
            },
        })
    }
}

fn parse_time(label: &str, raw: &str) -> Result<ClockTime, CatalogError> {
    match ClockTime::parse(raw) {
        ClockTime::Malformed(_) => Err(CatalogError::Invalid(format!(
            "{label} '{raw}' is not HH:MM or HH:MM:SS"
        ))),
        parsed => Ok(parsed),
    }
}

fn next_id(images: &[Image]) -> u64 {
    images
        .iter()
        .map(|image| image.id)
        .max()
        .map_or(1, |max| max + 1)
}

pub fn list<R: ImageRepository + ?Sized>(repo: &R) -> Result<Vec<Image>, CatalogError> {
    Ok(repo.try_get()?)
}

pub fn add<R: ImageRepository + ?Sized>(repo: &R, draft: ImageDraft) -> Result<Image, CatalogError> {
    let mut images = repo.try_get()?;
    let image = draft.into_image(next_id(&images))?;
    images.push(image.clone());
    repo.set(&images)?;
    info!(id = image.id, url = %image.url, "image added");
    Ok(image)
}

/// Replaces every field of image `id` except the id itself.
pub fn update<R: ImageRepository + ?Sized>(
    repo: &R,
    id: u64,
    draft: ImageDraft,
) -> Result<Image, CatalogError> {
    let mut images = repo.try_get()?;
    let slot = images
        .iter_mut()
        .find(|image| image.id == id)
        .ok_or(CatalogError::UnknownImage(id))?;
    let image = draft.into_image(id)?;
    *slot = image.clone();
    repo.set(&images)?;
    info!(id, url = %image.url, "image updated");
    Ok(image)
}

pub fn remove<R: ImageRepository + ?Sized>(repo: &R, id: u64) -> Result<Image, CatalogError> {
    let mut images = repo.try_get()?;
    let position = images
        .iter()
        .position(|image| image.id == id)
        .ok_or(CatalogError::UnknownImage(id))?;
    let removed = images.remove(position);
    repo.set(&images)?;
    info!(id, "image removed");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{JsonFileRepository, MemoryRepository};
    use chrono::{NaiveDate, Weekday};
    use std::fs;
    use tempfile::tempdir;

    fn repo_with(images: &[Image]) -> MemoryRepository {
        MemoryRepository::new(images.to_vec())
    }

    fn draft(url: &str) -> ImageDraft {
        ImageDraft {
            url: url.to_string(),
            every_day: true,
            ..ImageDraft::default()
        }
    }

    #[test]
    fn ids_continue_from_current_maximum() {
        let repo = MemoryRepository::default();
        assert_eq!(add(&repo, draft("a.jpg")).unwrap().id, 1);
        assert_eq!(add(&repo, draft("b.jpg")).unwrap().id, 2);
        remove(&repo, 1).unwrap();
        assert_eq!(add(&repo, draft("c.jpg")).unwrap().id, 3);

        remove(&repo, 2).unwrap();
        remove(&repo, 3).unwrap();
        assert_eq!(add(&repo, draft("d.jpg")).unwrap().id, 1);
    }

    #[test]
    fn draft_defaults_follow_admin_form() {
        let repo = MemoryRepository::default();
        let image = add(&repo, draft("a.jpg")).unwrap();
        let schedule = &image.display_schedule;
        assert_eq!(schedule.start_time.to_string(), "08:00:00");
        assert_eq!(schedule.end_time.to_string(), "20:00:00");
        assert_eq!(schedule.duration_sec, 10);
    }

    #[test]
    fn invalid_drafts_are_rejected() {
        let repo = MemoryRepository::default();
        let cases = [
            ImageDraft {
                duration_sec: 0,
                ..draft("a.jpg")
            },
            ImageDraft {
                start_time: "21:00".into(),
                ..draft("a.jpg")
            },
            ImageDraft {
                end_time: "noon".into(),
                ..draft("a.jpg")
            },
            ImageDraft {
                repeat_days: vec!["Funday".into()],
                ..draft("a.jpg")
            },
            draft("   "),
        ];
        for case in cases {
            assert!(
                matches!(add(&repo, case.clone()), Err(CatalogError::Invalid(_))),
                "{case:?} should be rejected"
            );
        }
        assert!(repo.get().is_empty());
    }

    #[test]
    fn update_keeps_id_and_replaces_fields() {
        let repo = MemoryRepository::default();
        add(&repo, draft("a.jpg")).unwrap();
        let original = add(&repo, draft("b.jpg")).unwrap();

        let mut edit = ImageDraft::from_image(&original);
        edit.every_day = false;
        edit.repeat_days = vec!["Wed".into(), "Wed".into(), "Fri".into()];
        edit.duration_sec = 30;
        let updated = update(&repo, original.id, edit).unwrap();

        assert_eq!(updated.id, 2);
        assert_eq!(updated.url, "b.jpg");
        assert_eq!(
            updated.display_schedule.repeat_days,
            vec![DayToken::Day(Weekday::Wed), DayToken::Day(Weekday::Fri)]
        );
        assert_eq!(list(&repo).unwrap()[1], updated);
    }

    #[test]
    fn malformed_expiry_must_be_replaced_before_saving() {
        let mut stored = add(&repo_with(&[]), draft("a.jpg")).unwrap();
        stored.expiry_date = Some(ExpiryDate::parse("next spring"));
        let repo = repo_with(&[stored.clone()]);

        let mut edit = ImageDraft::from_image(&stored);
        edit.duration_sec = 30;
        assert!(matches!(
            update(&repo, stored.id, edit.clone()),
            Err(CatalogError::Invalid(_))
        ));
        assert_eq!(list(&repo).unwrap(), vec![stored.clone()]);

        let expiry = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        edit.expiry_date = Some(expiry.into());
        let updated = update(&repo, stored.id, edit).unwrap();
        assert_eq!(updated.expiry_date, Some(ExpiryDate::Valid(expiry)));
    }

    #[test]
    fn edits_never_overwrite_unreadable_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("images.json");
        let body = r#"[
            {"id": 1, "url": "a.jpg", "expiry_date": null,
             "display_schedule": {"start_time": "08:00:00", "end_time": "20:00:00",
                                  "repeat_days": [], "every_day": true, "duration_sec": 10}},
            {"id": 2, "url": "b.jpg", "expiry_date": null,
             "display_schedule": {"start_time": "08:00:00", "end_time": "20:00:00",
                                  "repeat_days": [], "every_day": "yes", "duration_sec": 10}}
        ]"#;
        fs::write(&path, body).unwrap();
        let repo = JsonFileRepository::new(&path);

        assert!(matches!(
            add(&repo, draft("c.jpg")),
            Err(CatalogError::Repository(_))
        ));
        assert!(remove(&repo, 1).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), body);
    }

    #[test]
    fn null_duration_from_admin_form_is_kept_and_ids_continue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("images.json");
        fs::write(
            &path,
            r#"[
            {"id": 1, "url": "a.jpg", "expiry_date": null,
             "display_schedule": {"start_time": "08:00:00", "end_time": "20:00:00",
                                  "repeat_days": [], "every_day": true, "duration_sec": 10}},
            {"id": 2, "url": "b.jpg", "expiry_date": null,
             "display_schedule": {"start_time": "08:00:00", "end_time": "20:00:00",
                                  "repeat_days": [], "every_day": true, "duration_sec": null}}
        ]"#,
        )
        .unwrap();
        let repo = JsonFileRepository::new(&path);

        let added = add(&repo, draft("c.jpg")).unwrap();
        assert_eq!(added.id, 3);
        let urls: Vec<String> = list(&repo).unwrap().into_iter().map(|i| i.url).collect();
        assert_eq!(urls, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let repo = MemoryRepository::default();
        assert!(matches!(
            update(&repo, 9, draft("a.jpg")),
            Err(CatalogError::UnknownImage(9))
        ));
        assert!(matches!(remove(&repo, 9), Err(CatalogError::UnknownImage(9))));
    }
}
