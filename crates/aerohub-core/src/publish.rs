//! Publishing, revising and removing liveries.
//!
//! Drafts are checked against the upload form limits before anything is sent.
//! Images are content-addressed by SHA-256: identical files in one draft are
//! uploaded once, and the object path carries a digest prefix so re-uploads
//! of the same file land on the same object. Uploads are upserts, so landing
//! on an existing object replaces it rather than failing.

use std::collections::HashSet;

use bytes::Bytes;
use futures_util::future::try_join_all;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use aerohub_gateway::{Gateway, GatewayError, Result, Session, require_session};
use aerohub_types::models::{
    ACCEPTED_IMAGE_TYPES, Livery, LiveryId, LiveryPatch, MAX_DESCRIPTION_LEN, MAX_IMAGE_BYTES,
    MAX_IMAGES, MAX_TEXTURE_FIELD_LEN, MAX_TITLE_LEN, NewLivery, TextureId,
};

/// Length of the digest prefix in object paths.
const DIGEST_PREFIX_LEN: usize = 16;

/// An image picked in the upload form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// One image slot of an edited livery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Already uploaded; must be one of the livery's current images.
    Existing(String),
    New(ImageFile),
}

/// The upload form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveryDraft {
    pub title: String,
    pub description: Option<String>,
    pub aircraft: String,
    pub texture_ids: Vec<TextureId>,
    /// Raw JSON text; blank means none.
    pub advanced_customization: Option<String>,
    pub images: Vec<ImageFile>,
}

/// The edit form. Images are listed in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveryRevision {
    pub title: String,
    pub description: Option<String>,
    pub aircraft: String,
    pub texture_ids: Vec<TextureId>,
    pub advanced_customization: Option<String>,
    pub images: Vec<ImageSource>,
}

/// Checked text fields shared by drafts and revisions.
struct Fields {
    title: String,
    description: Option<String>,
    aircraft: String,
    texture_ids: Vec<TextureId>,
    advanced_customization: Option<serde_json::Value>,
}

/// An image ready for upload.
struct Upload {
    object_path: String,
    content_type: String,
    bytes: Bytes,
}

/// Validate `draft`, upload its images and create the livery as the signed-in
/// user.
pub async fn publish_livery<G: Gateway + ?Sized>(gateway: &G, draft: LiveryDraft) -> Result<Livery> {
    let user_id = require_session(gateway)?.user_id.clone();

    let fields = check_fields(
        draft.title,
        draft.description,
        draft.aircraft,
        draft.texture_ids,
        draft.advanced_customization,
    )?;

    let mut seen = HashSet::new();
    let mut uploads = Vec::with_capacity(draft.images.len());
    for file in draft.images {
        check_image(&file)?;
        if let Some(upload) = prepare_upload(&user_id, file, &mut seen) {
            uploads.push(upload);
        }
    }
    check_image_count(uploads.len())?;

    let images = upload_all(gateway, &uploads).await?;

    let created = gateway
        .insert_livery(&NewLivery {
            user_id: user_id.clone(),
            title: fields.title,
            description: fields.description,
            vehicle_name: fields.aircraft.clone(),
            vehicle_type: fields.aircraft,
            images,
            texture_ids: fields.texture_ids,
            advanced_customization: fields.advanced_customization,
        })
        .await?;

    info!("User {} published livery {} ({})", user_id, created.id, created.title);
    Ok(created)
}

/// Replace the editable fields of a livery the signed-in user owns.
///
/// Existing images keep their URLs, new files are uploaded, and the result
/// keeps the order given in `revision.images`.
pub async fn revise_livery<G: Gateway + ?Sized>(
    gateway: &G,
    id: LiveryId,
    revision: LiveryRevision,
) -> Result<Livery> {
    let session = require_session(gateway)?;
    let current = gateway.get_livery(id).await?;
    ensure_owner(session, &current)?;

    let fields = check_fields(
        revision.title,
        revision.description,
        revision.aircraft,
        revision.texture_ids,
        revision.advanced_customization,
    )?;

    // Each slot is either a kept URL or an index into `uploads`.
    let mut slots: Vec<std::result::Result<String, usize>> = Vec::new();
    let mut uploads = Vec::new();
    let mut seen = HashSet::new();
    for source in revision.images {
        match source {
            ImageSource::Existing(url) => {
                if !current.images.contains(&url) {
                    return Err(GatewayError::Validation(format!(
                        "image {url} does not belong to livery {id}"
                    )));
                }
                if !slots.iter().any(|s| s.as_ref() == Ok(&url)) {
                    slots.push(Ok(url));
                }
            }
            ImageSource::New(file) => {
                check_image(&file)?;
                if let Some(upload) = prepare_upload(&session.user_id, file, &mut seen) {
                    slots.push(Err(uploads.len()));
                    uploads.push(upload);
                }
            }
        }
    }
    check_image_count(slots.len())?;

    let uploaded = upload_all(gateway, &uploads).await?;
    let images = slots
        .into_iter()
        .map(|slot| match slot {
            Ok(url) => url,
            Err(index) => uploaded[index].clone(),
        })
        .collect();

    let patch = LiveryPatch {
        title: Some(fields.title),
        description: Some(fields.description),
        vehicle_name: Some(fields.aircraft.clone()),
        vehicle_type: Some(fields.aircraft),
        images: Some(images),
        texture_ids: Some(fields.texture_ids),
        advanced_customization: Some(fields.advanced_customization),
    };
    let updated = gateway.update_livery(id, &patch).await?;

    info!("User {} revised livery {}", session.user_id, id);
    Ok(updated)
}

/// Delete a livery the signed-in user owns.
pub async fn remove_livery<G: Gateway + ?Sized>(gateway: &G, id: LiveryId) -> Result<()> {
    let session = require_session(gateway)?;
    let current = gateway.get_livery(id).await?;
    ensure_owner(session, &current)?;

    gateway.delete_livery(id).await?;
    info!("User {} removed livery {}", session.user_id, id);
    Ok(())
}

fn ensure_owner(session: &Session, livery: &Livery) -> Result<()> {
    if livery.user_id != session.user_id {
        return Err(GatewayError::Auth(format!(
            "livery {} belongs to another user",
            livery.id
        )));
    }
    Ok(())
}

fn check_fields(
    title: String,
    description: Option<String>,
    aircraft: String,
    texture_ids: Vec<TextureId>,
    advanced_customization: Option<String>,
) -> Result<Fields> {
    let title = title.trim().to_string();
    if title.is_empty() {
        return invalid("Title is required");
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return invalid(format!("Title must be {MAX_TITLE_LEN} characters or less"));
    }

    let description = description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if description
        .as_ref()
        .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
    {
        return invalid(format!(
            "Description must be {MAX_DESCRIPTION_LEN} characters or less"
        ));
    }

    let aircraft = aircraft.trim().to_string();
    if aircraft.is_empty() {
        return invalid("Aircraft is required");
    }

    if texture_ids.is_empty() {
        return invalid("At least one texture ID is required");
    }
    for texture in &texture_ids {
        for (label, value) in [("name", &texture.name), ("ID", &texture.id)] {
            let len = value.trim().chars().count();
            if len == 0 {
                return invalid(format!("Texture {label} is required"));
            }
            if len > MAX_TEXTURE_FIELD_LEN {
                return invalid(format!(
                    "Texture {label} must be {MAX_TEXTURE_FIELD_LEN} characters or less"
                ));
            }
        }
    }

    let advanced_customization = match advanced_customization
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
    {
        Some(raw) => Some(
            serde_json::from_str(raw)
                .map_err(|_| GatewayError::Validation("Advanced customization must be valid JSON".into()))?,
        ),
        None => None,
    };

    Ok(Fields {
        title,
        description,
        aircraft,
        texture_ids,
        advanced_customization,
    })
}

fn check_image(file: &ImageFile) -> Result<()> {
    if !ACCEPTED_IMAGE_TYPES.contains(&file.content_type.as_str()) {
        return invalid(format!(
            "{} is not a JPEG, PNG or WebP image",
            file.file_name
        ));
    }
    if file.bytes.is_empty() {
        return invalid(format!("{} is empty", file.file_name));
    }
    if file.bytes.len() > MAX_IMAGE_BYTES {
        return invalid(format!(
            "{} is larger than {} MB",
            file.file_name,
            MAX_IMAGE_BYTES / (1024 * 1024)
        ));
    }
    Ok(())
}

fn check_image_count(count: usize) -> Result<()> {
    if count == 0 {
        return invalid("At least one image is required");
    }
    if count > MAX_IMAGES {
        return invalid(format!("At most {MAX_IMAGES} images are allowed"));
    }
    Ok(())
}

/// Object path for `file`, or `None` if an identical file was already seen.
fn prepare_upload(user_id: &str, file: ImageFile, seen: &mut HashSet<String>) -> Option<Upload> {
    let digest = hex::encode(Sha256::digest(&file.bytes));
    if !seen.insert(digest.clone()) {
        debug!("Dropping duplicate image {}", file.file_name);
        return None;
    }

    Some(Upload {
        object_path: format!(
            "{}/{}-{}",
            user_id,
            &digest[..DIGEST_PREFIX_LEN],
            safe_file_name(&file.file_name)
        ),
        content_type: file.content_type,
        bytes: file.bytes,
    })
}

/// Keep file names URL- and path-safe.
fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Upload concurrently. URLs come back in input order.
async fn upload_all<G: Gateway + ?Sized>(gateway: &G, uploads: &[Upload]) -> Result<Vec<String>> {
    try_join_all(uploads.iter().map(|upload| {
        gateway.upload_image(&upload.object_path, upload.bytes.clone(), &upload.content_type)
    }))
    .await
}

fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(GatewayError::Validation(message.into()))
}

#[cfg(test)]
mod tests {
    use aerohub_gateway::memory::{MemoryGateway, Operation};

    use super::*;
    use crate::fixtures::livery;

    fn png(name: &str, content: &[u8]) -> ImageFile {
        ImageFile {
            file_name: name.into(),
            content_type: "image/png".into(),
            bytes: Bytes::copy_from_slice(content),
        }
    }

    fn draft(images: Vec<ImageFile>) -> LiveryDraft {
        LiveryDraft {
            title: "  EVA Air Hello Kitty ".into(),
            description: Some(String::new()),
            aircraft: "A330-300".into(),
            texture_ids: vec![TextureId {
                name: "Fuselage".into(),
                id: "12345".into(),
            }],
            advanced_customization: Some(r#"{"reflectance": 0.4}"#.into()),
            images,
        }
    }

    fn digest_prefix(content: &[u8]) -> String {
        hex::encode(Sha256::digest(content))[..DIGEST_PREFIX_LEN].to_string()
    }

    #[tokio::test]
    async fn publishes_as_signed_in_user() {
        let store = MemoryGateway::new();
        let gateway = store.signed_in("user_1");

        let created = publish_livery(&gateway, draft(vec![png("cover shot.png", b"cover"), png("side.png", b"side")]))
            .await
            .unwrap();

        assert_eq!(created.user_id, "user_1");
        assert_eq!(created.title, "EVA Air Hello Kitty");
        assert_eq!(created.description, None);
        assert_eq!(created.vehicle_name, "A330-300");
        assert_eq!(
            created.advanced_customization,
            Some(serde_json::json!({"reflectance": 0.4}))
        );

        let cover_path = format!("user_1/{}-cover_shot.png", digest_prefix(b"cover"));
        assert_eq!(created.images.len(), 2);
        assert_eq!(created.images[0], format!("memory://livery-images/{cover_path}"));
        assert_eq!(store.object(&cover_path).unwrap().1, "image/png");
        assert_eq!(store.livery(created.id).unwrap(), created);
    }

    #[tokio::test]
    async fn duplicate_images_upload_once() {
        let store = MemoryGateway::new();
        let gateway = store.signed_in("user_1");

        let created = publish_livery(
            &gateway,
            draft(vec![png("a.png", b"same"), png("b.png", b"same"), png("c.png", b"other")]),
        )
        .await
        .unwrap();

        assert_eq!(created.images.len(), 2);
        assert_eq!(store.calls(Operation::UploadImage), 2);
    }

    #[tokio::test]
    async fn anonymous_publish_is_rejected_before_upload() {
        let store = MemoryGateway::new();

        let err = publish_livery(&store, draft(vec![png("a.png", b"a")]))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Auth(_)));
        assert_eq!(store.calls(Operation::UploadImage), 0);
        assert_eq!(store.calls(Operation::InsertLivery), 0);
    }

    #[tokio::test]
    async fn invalid_drafts_never_reach_the_store() {
        let store = MemoryGateway::new();
        let gateway = store.signed_in("user_1");

        let mut long_title = draft(vec![png("a.png", b"a")]);
        long_title.title = "x".repeat(MAX_TITLE_LEN + 1);

        let mut no_textures = draft(vec![png("a.png", b"a")]);
        no_textures.texture_ids.clear();

        let mut bad_json = draft(vec![png("a.png", b"a")]);
        bad_json.advanced_customization = Some("{not json".into());

        let mut gif = draft(vec![png("a.gif", b"a")]);
        gif.images[0].content_type = "image/gif".into();

        let too_many = draft((0..6).map(|i| png(&format!("{i}.png"), &[i])).collect());
        let no_images = draft(Vec::new());

        for case in [long_title, no_textures, bad_json, gif, too_many, no_images] {
            let err = publish_livery(&gateway, case).await.unwrap_err();
            assert!(matches!(err, GatewayError::Validation(_)), "got {err:?}");
        }
        assert_eq!(store.calls(Operation::UploadImage), 0);
        assert_eq!(store.calls(Operation::InsertLivery), 0);
    }

    #[test]
    fn oversized_images_are_rejected() {
        let big = ImageFile {
            file_name: "huge.webp".into(),
            content_type: "image/webp".into(),
            bytes: Bytes::from(vec![0u8; MAX_IMAGE_BYTES + 1]),
        };
        assert!(check_image(&big).is_err());
    }

    #[tokio::test]
    async fn failed_upload_skips_insert() {
        let store = MemoryGateway::new();
        let gateway = store.signed_in("user_1");
        store.fail_next(Operation::UploadImage, GatewayError::Mutation("bucket full".into()));

        let err = publish_livery(&gateway, draft(vec![png("a.png", b"a")]))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Mutation(_)));
        assert_eq!(store.calls(Operation::InsertLivery), 0);
    }

    #[tokio::test]
    async fn republishing_the_same_image_reuses_its_object() {
        let store = MemoryGateway::new();
        let gateway = store.signed_in("user_1");

        let first = publish_livery(&gateway, draft(vec![png("cover.png", b"cover")]))
            .await
            .unwrap();
        let second = publish_livery(&gateway, draft(vec![png("cover.png", b"cover")]))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.images, second.images);
        assert_eq!(store.calls(Operation::UploadImage), 2);
    }

    #[tokio::test]
    async fn publish_retries_after_failed_insert() {
        let store = MemoryGateway::new();
        let gateway = store.signed_in("user_1");
        store.fail_next(Operation::InsertLivery, GatewayError::Mutation("connection reset".into()));

        let err = publish_livery(&gateway, draft(vec![png("cover.png", b"cover")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Mutation(_)));

        // The image is already in the bucket; the retry uploads it again.
        let created = publish_livery(&gateway, draft(vec![png("cover.png", b"cover")]))
            .await
            .unwrap();
        let cover_path = format!("user_1/{}-cover.png", digest_prefix(b"cover"));
        assert_eq!(created.images, vec![format!("memory://livery-images/{cover_path}")]);
        assert_eq!(store.calls(Operation::UploadImage), 2);
        assert_eq!(store.livery(created.id).unwrap(), created);
    }

    #[tokio::test]
    async fn revision_keeps_image_order() {
        let store = MemoryGateway::new();
        let mut existing = livery(5, "Old title", 3, 0, 2);
        existing.images = vec!["https://cdn.test/one.png".into(), "https://cdn.test/two.png".into()];
        store.seed_livery(existing);
        let gateway = store.signed_in("user_1");

        let revision = LiveryRevision {
            title: "New title".into(),
            description: Some("Now with winglets".into()),
            aircraft: "A321neo".into(),
            texture_ids: vec![TextureId {
                name: "Body".into(),
                id: "9".into(),
            }],
            advanced_customization: None,
            images: vec![
                ImageSource::Existing("https://cdn.test/two.png".into()),
                ImageSource::New(png("fresh.png", b"fresh")),
                ImageSource::Existing("https://cdn.test/one.png".into()),
            ],
        };
        let updated = revise_livery(&gateway, LiveryId(5), revision).await.unwrap();

        assert_eq!(updated.title, "New title");
        assert_eq!(updated.vehicle_name, "A321neo");
        assert_eq!(updated.likes, 3);
        assert_eq!(
            updated.images,
            vec![
                "https://cdn.test/two.png".to_string(),
                format!("memory://livery-images/user_1/{}-fresh.png", digest_prefix(b"fresh")),
                "https://cdn.test/one.png".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn revision_rejects_foreign_image_urls() {
        let store = MemoryGateway::new();
        store.seed_livery(livery(5, "Old title", 0, 0, 0));
        let gateway = store.signed_in("user_1");

        let revision = LiveryRevision {
            title: "New title".into(),
            description: None,
            aircraft: "A320".into(),
            texture_ids: vec![TextureId {
                name: "Body".into(),
                id: "9".into(),
            }],
            advanced_customization: None,
            images: vec![ImageSource::Existing("https://elsewhere.test/x.png".into())],
        };

        let err = revise_livery(&gateway, LiveryId(5), revision).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(store.calls(Operation::UpdateLivery), 0);
    }

    #[tokio::test]
    async fn only_the_owner_can_revise_or_remove() {
        let store = MemoryGateway::new();
        store.seed_livery(livery(5, "Mine", 0, 0, 0));
        let intruder = store.signed_in("user_2");

        let revision = LiveryRevision {
            title: "Hijacked".into(),
            description: None,
            aircraft: "A320".into(),
            texture_ids: vec![TextureId {
                name: "Body".into(),
                id: "9".into(),
            }],
            advanced_customization: None,
            images: vec![ImageSource::New(png("x.png", b"x"))],
        };
        let err = revise_livery(&intruder, LiveryId(5), revision).await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));

        let err = remove_livery(&intruder, LiveryId(5)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));

        assert_eq!(store.livery(LiveryId(5)).unwrap().title, "Mine");
        assert_eq!(store.calls(Operation::UploadImage), 0);
        assert_eq!(store.calls(Operation::DeleteLivery), 0);

        remove_livery(&store.signed_in("user_1"), LiveryId(5)).await.unwrap();
        assert!(store.livery(LiveryId(5)).is_none());
    }
}
