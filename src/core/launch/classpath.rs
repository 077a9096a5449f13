// ─── Classpath Builder ───
// Classpath order and native library extraction for a resolved version.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::downloader::checksum::file_sha1;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::state::CacheLayout;
use crate::core::version::{Platform, VersionDescriptor};

const NATIVES_MARKER: &str = ".extracted";

/// Classpath entries: applicable libraries in declared order, client jar
/// last. Natives-only libraries contribute nothing. Pure; nothing is read
/// from disk.
pub fn build_classpath(
    descriptor: &VersionDescriptor,
    layout: &CacheLayout,
    platform: &Platform,
) -> LauncherResult<Vec<PathBuf>> {
    let libs_dir = layout.libraries_dir();
    let mut entries = Vec::new();

    for lib in descriptor.applicable_libraries(platform) {
        if let Some(artifact) = lib.artifact()? {
            entries.push(libs_dir.join(&artifact.path));
        }
    }
    entries.push(layout.client_jar_path(&descriptor.id));

    dedup_preserving_order(&mut entries);
    Ok(entries)
}

pub fn join_classpath(entries: &[PathBuf], platform: &Platform) -> String {
    entries
        .iter()
        .map(|p| path_arg(p))
        .collect::<Vec<_>>()
        .join(platform.classpath_separator())
}

fn dedup_preserving_order(entries: &mut Vec<PathBuf>) {
    let mut seen = HashSet::new();
    entries.retain(|entry| {
        let key = if cfg!(target_os = "windows") {
            entry.to_string_lossy().to_lowercase()
        } else {
            entry.to_string_lossy().to_string()
        };
        seen.insert(key)
    });
}

/// Path as passed on the command line. Java mishandles Windows
/// extended-length prefixes, so they are stripped.
pub fn path_arg(path: &Path) -> String {
    let text = path.to_string_lossy().to_string();
    match text.strip_prefix(r"\\?\") {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// A jar carrying native binaries, with the entry prefixes to skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeJar {
    pub path: PathBuf,
    pub excludes: Vec<String>,
}

pub fn native_jars(
    descriptor: &VersionDescriptor,
    layout: &CacheLayout,
    platform: &Platform,
) -> LauncherResult<Vec<NativeJar>> {
    let libs_dir = layout.libraries_dir();
    let mut jars = Vec::new();
    for lib in descriptor.applicable_libraries(platform) {
        if let Some(native) = lib.native_artifact(platform)? {
            jars.push(NativeJar {
                path: libs_dir.join(&native.path),
                excludes: lib.extract_excludes(),
            });
        }
    }
    Ok(jars)
}

#[derive(Debug, Serialize, Deserialize)]
struct NativesMarker {
    extracted_at: DateTime<Utc>,
    /// SHA-1 of every source jar, in extraction order.
    sources: Vec<String>,
}

/// Unpack the platform's native jars into `versions/<id>/natives`.
///
/// Skipped when the directory's marker lists the same source jars; any other
/// content is wiped and extracted again.
pub async fn extract_natives(
    descriptor: &VersionDescriptor,
    layout: &CacheLayout,
    platform: &Platform,
) -> LauncherResult<PathBuf> {
    let natives_dir = layout.natives_dir(&descriptor.id);
    let jars = native_jars(descriptor, layout, platform)?;

    let mut sources = Vec::with_capacity(jars.len());
    for jar in &jars {
        sources.push(file_sha1(&jar.path).await?);
    }

    let marker_path = natives_dir.join(NATIVES_MARKER);
    if let Ok(raw) = tokio::fs::read_to_string(&marker_path).await {
        if let Ok(marker) = serde_json::from_str::<NativesMarker>(&raw) {
            if marker.sources == sources {
                debug!("Natives for {} already extracted", descriptor.id);
                return Ok(natives_dir);
            }
        }
    }

    if tokio::fs::try_exists(&natives_dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&natives_dir)
            .await
            .map_err(|e| LauncherError::io(&natives_dir, e))?;
    }
    tokio::fs::create_dir_all(&natives_dir)
        .await
        .map_err(|e| LauncherError::io(&natives_dir, e))?;

    let mut extracted = 0usize;
    for jar in jars {
        let dest = natives_dir.clone();
        extracted += tokio::task::spawn_blocking(move || extract_jar(&jar, &dest))
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))??;
    }

    let marker = NativesMarker {
        extracted_at: Utc::now(),
        sources,
    };
    let json = serde_json::to_string_pretty(&marker)?;
    tokio::fs::write(&marker_path, json)
        .await
        .map_err(|e| LauncherError::io(&marker_path, e))?;

    info!(
        "Extracted {} native file(s) for {} into {:?}",
        extracted, descriptor.id, natives_dir
    );
    Ok(natives_dir)
}

fn extract_jar(jar: &NativeJar, dest: &Path) -> LauncherResult<usize> {
    let file = std::fs::File::open(&jar.path).map_err(|e| LauncherError::io(&jar.path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut count = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if entry.is_dir() || jar.excludes.iter().any(|prefix| name.starts_with(prefix)) {
            continue;
        }
        // Entries escaping the target directory are dropped.
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };

        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        // Streamed; the size in the entry header is not trusted.
        let mut out = std::fs::File::create(&target).map_err(|e| LauncherError::io(&target, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&jar.path, e))?;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::core::version::{Arch, OsName};

    const LINUX: Platform = Platform::new(OsName::Linux, Arch::X86_64);
    const WINDOWS: Platform = Platform::new(OsName::Windows, Arch::X86_64);

    fn descriptor() -> VersionDescriptor {
        VersionDescriptor::parse(
            r#"{
                "id": "1.8",
                "mainClass": "net.minecraft.client.main.Main",
                "libraries": [
                    {"name": "com.example:a:1.0"},
                    {"name": "com.example:b:1.0",
                     "rules": [{"action": "allow", "os": {"name": "windows"}}]},
                    {"name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.4",
                     "natives": {"linux": "natives-linux", "windows": "natives-windows"},
                     "extract": {"exclude": ["META-INF/"]},
                     "downloads": {"classifiers": {
                        "natives-linux": {"url": "https://example.com/l.jar",
                            "path": "org/lwjgl/lwjgl/lwjgl-platform/2.9.4/lwjgl-platform-2.9.4-natives-linux.jar"}
                     }}},
                    {"name": "com.example:a:1.0"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn classpath_skips_other_platforms_and_ends_with_jar() {
        let layout = CacheLayout::new("/mc");
        let cp = build_classpath(&descriptor(), &layout, &LINUX).unwrap();
        assert_eq!(
            cp,
            vec![
                PathBuf::from("/mc/libraries/com/example/a/1.0/a-1.0.jar"),
                PathBuf::from("/mc/versions/1.8/1.8.jar"),
            ]
        );

        let cp = build_classpath(&descriptor(), &layout, &WINDOWS).unwrap();
        assert_eq!(cp.len(), 3);
        assert_eq!(cp[1], PathBuf::from("/mc/libraries/com/example/b/1.0/b-1.0.jar"));
    }

    #[test]
    fn joined_with_platform_separator() {
        let entries = vec![PathBuf::from("/a.jar"), PathBuf::from("/b.jar")];
        assert_eq!(join_classpath(&entries, &LINUX), "/a.jar:/b.jar");
        assert_eq!(join_classpath(&entries, &WINDOWS), "/a.jar;/b.jar");
    }

    fn write_native_jar(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("liblwjgl.so", options).unwrap();
        zip.write_all(b"native code").unwrap();
        zip.start_file("META-INF/MANIFEST.MF", options).unwrap();
        zip.write_all(b"Manifest-Version: 1.0").unwrap();
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn natives_are_extracted_once() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        let d = descriptor();
        let jar = native_jars(&d, &layout, &LINUX).unwrap();
        assert_eq!(jar.len(), 1);
        write_native_jar(&jar[0].path);

        let natives = extract_natives(&d, &layout, &LINUX).await.unwrap();
        assert_eq!(natives, layout.natives_dir("1.8"));
        assert!(natives.join("liblwjgl.so").exists());
        assert!(!natives.join("META-INF").exists());

        // A populated directory with a matching marker is left alone.
        std::fs::write(natives.join("liblwjgl.so"), b"touched").unwrap();
        extract_natives(&d, &layout, &LINUX).await.unwrap();
        assert_eq!(std::fs::read(natives.join("liblwjgl.so")).unwrap(), b"touched");

        // Without a marker the directory is rebuilt.
        std::fs::remove_file(natives.join(NATIVES_MARKER)).unwrap();
        extract_natives(&d, &layout, &LINUX).await.unwrap();
        assert_eq!(std::fs::read(natives.join("liblwjgl.so")).unwrap(), b"native code");
    }

    /// Overwrites the uncompressed size in every local and central header.
    fn claim_uncompressed_size(bytes: &mut [u8], size: u32) {
        let mut i = 0;
        while i + 4 <= bytes.len() {
            let offset = match &bytes[i..i + 4] {
                [0x50, 0x4b, 0x03, 0x04] => Some(22),
                [0x50, 0x4b, 0x01, 0x02] => Some(24),
                _ => None,
            };
            if let Some(offset) = offset {
                bytes[i + offset..i + offset + 4].copy_from_slice(&size.to_le_bytes());
            }
            i += 1;
        }
    }

    #[tokio::test]
    async fn oversized_entry_header_does_not_drive_allocation() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        let d = descriptor();
        let jar = native_jars(&d, &layout, &LINUX).unwrap();
        std::fs::create_dir_all(jar[0].path.parent().unwrap()).unwrap();

        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("liblwjgl.so", options).unwrap();
            zip.write_all(b"native code").unwrap();
            zip.finish().unwrap();
        }
        let mut bytes = buf.into_inner();
        claim_uncompressed_size(&mut bytes, 0xFFFF_FFF0);
        std::fs::write(&jar[0].path, bytes).unwrap();

        let natives = extract_natives(&d, &layout, &LINUX).await.unwrap();
        assert_eq!(std::fs::read(natives.join("liblwjgl.so")).unwrap(), b"native code");
    }
}
