//! Object key construction and the upload write path.
//!
//! Uploaded files are stored under `{prefix}/{millis}-{slug}{ext}` and
//! referenced by catalog records through the public path
//! `/uploads/{object_key}`.

use bytes::Bytes;

use crate::errors::StorageError;
use crate::storage::{StorageContext, DEFAULT_CACHE_CONTROL, DEFAULT_CONTENT_TYPE};

/// URL prefix under which stored objects are served.
pub const PUBLIC_PREFIX: &str = "/uploads/";

/// Where an upload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedObject {
    /// Normalized key inside the bucket.
    pub object_key: String,
    /// `/uploads/{object_key}`.
    pub public_path: String,
}

/// Lower-case, collapse every run of non-alphanumerics to one `-`, trim
/// hyphens at both ends.  Empty results become `file`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "file".to_string()
    } else {
        slug
    }
}

/// Split `original` into `(stem, extension)`.  The extension keeps its dot,
/// is lower-cased and stripped to ASCII alphanumerics; a name without a
/// usable extension gets `.bin`.
fn split_extension(original: &str) -> (&str, String) {
    let Some(dot) = original.rfind('.') else {
        return (original, ".bin".to_string());
    };
    let ext: String = original[dot + 1..]
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if ext.is_empty() {
        (&original[..dot], ".bin".to_string())
    } else {
        (&original[..dot], format!(".{ext}"))
    }
}

/// Build a key from an explicit timestamp.
fn build_key_at(millis: i64, original: &str, prefix: &str) -> String {
    let (stem, ext) = split_extension(original);
    let base = format!("{}-{}{}", millis, slugify(stem), ext);
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        base
    } else {
        format!("{prefix}/{base}")
    }
}

/// Derive an object key for `original` under an optional folder `prefix`.
///
/// Two calls in the same millisecond with the same stem produce the same key.
pub fn build_key(original: &str, prefix: &str) -> String {
    build_key_at(chrono::Utc::now().timestamp_millis(), original, prefix)
}

/// `/uploads/{key}` for a stored key.
pub fn public_path(object_key: &str) -> String {
    format!("{PUBLIC_PREFIX}{object_key}")
}

/// Recover the object key from a catalog image reference.
///
/// Accepts `/uploads/foods/x.jpg`, `uploads/foods/x.jpg` and bare keys.
/// Absolute URLs and empty strings yield `None`.
pub fn key_from_image_ref(image_ref: &str) -> Option<String> {
    let trimmed = image_ref.trim();
    if trimmed.is_empty() || trimmed.contains("://") {
        return None;
    }
    let rel = trimmed.trim_start_matches('/');
    let rel = rel.strip_prefix("uploads/").unwrap_or(rel);
    let key = crate::storage::normalize_path(rel);
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Store an uploaded buffer and return where it went.
pub async fn save_object(
    storage: &StorageContext,
    data: Bytes,
    original_filename: Option<&str>,
    mime_type: Option<&str>,
    prefix: &str,
) -> Result<SavedObject, StorageError> {
    let original = original_filename
        .filter(|s| !s.is_empty())
        .unwrap_or("file.bin");
    let key = build_key(original, prefix);
    let object_key = storage
        .put(
            &key,
            data,
            Some(mime_type.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_CONTENT_TYPE)),
            Some(DEFAULT_CACHE_CONTROL),
        )
        .await?;
    Ok(SavedObject {
        public_path: public_path(&object_key),
        object_key,
    })
}

/// Remove the object behind a catalog image reference, if any.
pub async fn delete_image_ref(storage: &StorageContext, image_ref: Option<&str>) {
    if let Some(key) = image_ref.and_then(key_from_image_ref) {
        storage.delete(&key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use std::sync::Arc;

    /// `\d+-{rest}` with an optional `{prefix}/` in front.
    fn matches_key(key: &str, prefix: Option<&str>, rest: &str) -> bool {
        let key = match prefix {
            Some(p) => match key.strip_prefix(&format!("{p}/")) {
                Some(k) => k,
                None => return false,
            },
            None => key,
        };
        match key.split_once('-') {
            Some((digits, tail)) => {
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) && tail == rest
            }
            None => false,
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Photo"), "my-photo");
        assert_eq!(slugify("  --Hello__World--  "), "hello-world");
        assert_eq!(slugify("???"), "file");
        assert_eq!(slugify(""), "file");
        assert_eq!(slugify("jollof rice (large)"), "jollof-rice-large");
        assert_eq!(slugify("Café"), "caf");
    }

    #[test]
    fn test_build_key_with_prefix() {
        let key = build_key("My Photo.JPG", "foods");
        assert!(matches_key(&key, Some("foods"), "my-photo.jpg"), "{key}");
    }

    #[test]
    fn test_build_key_without_extension() {
        let key = build_key("noext", "");
        assert!(matches_key(&key, None, "noext.bin"), "{key}");
    }

    #[test]
    fn test_build_key_empty_stem_falls_back() {
        let key = build_key("???.png", "");
        assert!(matches_key(&key, None, "file.png"), "{key}");
    }

    #[test]
    fn test_build_key_deterministic_for_timestamp() {
        assert_eq!(
            build_key_at(1700000000123, "Rice & Beans.PNG", "/drinks/"),
            "drinks/1700000000123-rice-beans.png"
        );
        assert_eq!(build_key_at(5, "a.b.c", ""), "5-a-b.c");
        assert_eq!(build_key_at(5, ".hidden", ""), "5-file.hidden");
        assert_eq!(build_key_at(5, "photo.", ""), "5-photo.bin");
        assert_eq!(build_key_at(5, "a.J P/G", ""), "5-a.jpg");
    }

    #[test]
    fn test_build_key_is_normalized() {
        let key = build_key("../../etc/passwd", "//foods//");
        assert_eq!(crate::storage::normalize_path(&key), key);
        assert!(key.starts_with("foods/"));
        assert_eq!(key.matches('/').count(), 1);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/-._".contains(c)));
    }

    #[test]
    fn test_key_from_image_ref() {
        assert_eq!(
            key_from_image_ref("/uploads/foods/x.jpg").as_deref(),
            Some("foods/x.jpg")
        );
        assert_eq!(
            key_from_image_ref("uploads/foods/x.jpg").as_deref(),
            Some("foods/x.jpg")
        );
        assert_eq!(
            key_from_image_ref("drinks/y.png").as_deref(),
            Some("drinks/y.png")
        );
        assert_eq!(key_from_image_ref(""), None);
        assert_eq!(key_from_image_ref("/uploads/"), None);
        assert_eq!(key_from_image_ref("https://cdn.example.com/a.jpg"), None);
    }

    #[tokio::test]
    async fn test_save_object_round_trip() {
        let backend = Arc::new(MemoryBackend::new());
        let ctx = StorageContext::with_backend(backend, "b").await.unwrap();
        let saved = save_object(
            &ctx,
            Bytes::from_static(b"jpeg-bytes"),
            Some("Jollof.jpg"),
            Some("image/jpeg"),
            "foods",
        )
        .await
        .unwrap();
        assert!(matches_key(&saved.object_key, Some("foods"), "jollof.jpg"));
        assert_eq!(saved.public_path, format!("/uploads/{}", saved.object_key));

        let meta = ctx.stat(&saved.object_key).await.unwrap().unwrap().meta;
        assert_eq!(meta.content_type, "image/jpeg");
        assert_eq!(meta.cache_control, DEFAULT_CACHE_CONTROL);

        delete_image_ref(&ctx, Some(&saved.public_path)).await;
        assert!(ctx.stat(&saved.object_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_object_defaults() {
        let ctx = StorageContext::with_backend(Arc::new(MemoryBackend::new()), "b")
            .await
            .unwrap();
        let saved = save_object(&ctx, Bytes::from_static(b"x"), None, None, "")
            .await
            .unwrap();
        assert!(matches_key(&saved.object_key, None, "file.bin"));
        let meta = ctx.stat(&saved.object_key).await.unwrap().unwrap().meta;
        assert_eq!(meta.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_save_object_rejects_empty_buffer() {
        let ctx = StorageContext::with_backend(Arc::new(MemoryBackend::new()), "b")
            .await
            .unwrap();
        let err = save_object(&ctx, Bytes::new(), Some("a.jpg"), None, "foods")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }
}
