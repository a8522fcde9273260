use crate::ImportError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use swarm_render::{GpuDevice, RendererBackend, ShaderKey, ShaderSource};

/// Resolves asset paths against a root folder and loads them.
#[derive(Debug, Clone, Default)]
pub struct AssetLoader {
    root: PathBuf,
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn set_asset_folder(&mut self, root: impl Into<PathBuf>) {
        self.root = root.into();
    }

    pub fn asset_folder(&self) -> &Path {
        &self.root
    }

    /// `path` joined onto the asset folder; absolute paths pass through.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    pub fn load_shader_source(&self, path: impl AsRef<Path>) -> Result<ShaderSource, ImportError> {
        load_shader_source(self.resolve(path))
    }

    pub fn import_shader<D: GpuDevice>(
        &self,
        backend: &mut RendererBackend<D>,
        path: impl AsRef<Path>,
    ) -> Result<ShaderKey, ImportError> {
        import_shader(backend, self.resolve(path))
    }

    pub fn cubemap_face_paths(&self, template: &str) -> [PathBuf; 6] {
        cubemap_face_paths(template).map(|face| self.resolve(face))
    }
}

pub(crate) fn read_text(path: &Path) -> Result<String, ImportError> {
    tracing::debug!(path = %path.display(), "loading file");
    std::fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Read the `<path>.vert` / `<path>.frag` pair.
pub fn load_shader_source(path: impl AsRef<Path>) -> Result<ShaderSource, ImportError> {
    let path = path.as_ref();
    let vertex = read_text(&with_suffix(path, ".vert"))?;
    let fragment = read_text(&with_suffix(path, ".frag"))?;
    Ok(ShaderSource { vertex, fragment })
}

/// Load a shader pair from disk and build it into the backend's pool.
pub fn import_shader<D: GpuDevice>(
    backend: &mut RendererBackend<D>,
    path: impl AsRef<Path>,
) -> Result<ShaderKey, ImportError> {
    let path = path.as_ref();
    let source = load_shader_source(path)?;
    backend
        .load_shader(&source.vertex, &source.fragment)
        .map_err(|source| ImportError::Shader {
            name: path.display().to_string(),
            source,
        })
}

/// Face paths of a cubemap template, `#` replaced by 0..=5.
pub fn cubemap_face_paths(template: &str) -> [String; 6] {
    std::array::from_fn(|face| template.replace('#', &face.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_render::{HeadlessDevice, HeadlessWindows, RendererConfig};

    fn backend() -> RendererBackend<HeadlessDevice> {
        RendererBackend::setup(
            || Ok(HeadlessDevice::new()),
            &mut HeadlessWindows::default(),
            RendererConfig::default(),
        )
        .unwrap()
    }

    fn write_pair(dir: &Path, name: &str, vertex: &str, fragment: &str) {
        std::fs::write(dir.join(format!("{name}.vert")), vertex).unwrap();
        std::fs::write(dir.join(format!("{name}.frag")), fragment).unwrap();
    }

    #[test]
    fn shader_pair_is_read_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), "lit", "@vertex fn vs_main() {}", "@fragment fn fs_main() {}");

        let source = load_shader_source(dir.path().join("lit")).unwrap();
        assert!(source.vertex.contains("@vertex"));
        assert!(source.fragment.contains("@fragment"));
    }

    #[test]
    fn missing_stage_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("half.vert"), "@vertex fn vs_main() {}").unwrap();

        match load_shader_source(dir.path().join("half")) {
            Err(ImportError::Io { path, .. }) => assert!(path.ends_with("half.frag")),
            other => panic!("expected an I/O error, got {other:?}"),
        }
    }

    #[test]
    fn import_builds_into_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), "ok", "@vertex fn vs_main() {}", "@fragment fn fs_main() {}");
        write_pair(dir.path(), "broken", "#error nope", "@fragment fn fs_main() {}");

        let loader = AssetLoader::new(dir.path());
        let mut backend = backend();
        let key = loader.import_shader(&mut backend, "ok").unwrap();
        assert!(backend.shader(key).unwrap().is_usable());

        let err = loader.import_shader(&mut backend, "broken").unwrap_err();
        assert!(matches!(err, ImportError::Shader { .. }));
    }

    #[test]
    fn cubemap_template_expands_per_face() {
        let faces = cubemap_face_paths("sky/face_#.png");
        assert_eq!(faces[0], "sky/face_0.png");
        assert_eq!(faces[5], "sky/face_5.png");

        let loader = AssetLoader::new("/assets");
        assert_eq!(
            loader.cubemap_face_paths("sky_#.png")[3],
            PathBuf::from("/assets/sky_3.png")
        );
    }
}
