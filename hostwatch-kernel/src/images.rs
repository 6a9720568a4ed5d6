use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;

pub const DEFAULT_IMAGE_NAMES: [&str; 4] = ["server1.png", "server2.png", "server3.png", "server4.png"];

/// Hands out display images to new hosts, cycling through a fixed set of names.
pub struct ImageRotation {
    base_url: String,
    names: Vec<String>,
    next: AtomicUsize,
}

impl ImageRotation {
    pub fn new(public_url: &str, names: &[String]) -> Self {
        let names = if names.is_empty() {
            DEFAULT_IMAGE_NAMES.iter().map(|n| n.to_string()).collect()
        } else {
            names.to_vec()
        };
        Self {
            base_url: public_url.trim_end_matches('/').to_string(),
            names,
            next: AtomicUsize::new(0),
        }
    }

    pub fn next_image_ref(&self) -> String {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.names.len();
        self.image_ref(&self.names[slot])
    }

    pub fn image_ref(&self, name: &str) -> String {
        format!("{}/server/image/{}", self.base_url, name)
    }

    #[cfg(test)]
    pub fn is_rotation_ref(&self, image_ref: &str) -> bool {
        self.names.iter().any(|n| self.image_ref(n) == image_ref)
    }
}

/// Directory of image files served by `GET /server/image/{name}`.
pub struct ImageLibrary {
    dir: PathBuf,
}

pub struct ImageFile {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

impl ImageLibrary {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// `Ok(None)` when the name is unsafe, not an image, or no such file exists.
    pub async fn load(&self, name: &str) -> std::io::Result<Option<ImageFile>> {
        if !is_plain_file_name(name) {
            return Ok(None);
        }
        let Some(content_type) = content_type_for(name) else { return Ok(None) };

        match fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(Some(ImageFile { bytes, content_type })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

fn content_type_for(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
