// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use super::super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Build a layer from `(path, contents)` pairs; `None` contents make a directory.
    fn tar_layer(files: &[(&str, Option<&str>)]) -> Layer {
        let mut builder = Builder::new(Vec::new());
        for (path, contents) in files {
            let mut header = Header::new_gnu();
            match contents {
                Some(data) => {
                    header.set_entry_type(EntryType::Regular);
                    header.set_size(data.len() as u64);
                    header.set_mode(0o644);
                    builder
                        .append_data(&mut header, path, data.as_bytes())
                        .unwrap();
                }
                None => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(0o755);
                    builder
                        .append_data(&mut header, path, std::io::empty())
                        .unwrap();
                }
            }
        }
        Layer {
            media_type: "application/vnd.oci.image.layer.v1.tar".to_string(),
            data: builder.into_inner().unwrap(),
        }
    }

    fn gzip(layer: Layer) -> Layer {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&layer.data).unwrap();
        Layer {
            media_type: "application/vnd.oci.image.layer.v1.tar+gzip".to_string(),
            data: encoder.finish().unwrap(),
        }
    }

    fn image(layers: Vec<Layer>) -> Image {
        Image {
            digest: "sha256:test".to_string(),
            layers,
        }
    }

    fn entry_names(bundle: &[u8]) -> Vec<String> {
        let mut archive = Archive::new(bundle);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_read_version_from_gzip_layer() {
        let layer = gzip(tar_layer(&[("version.json", Some(r#"{"version":"v1.2.3"}"#))]));
        assert_eq!(read_version(&image(vec![layer])).unwrap(), "v1.2.3");
    }

    #[test]
    fn test_read_version_prefers_top_layer() {
        let bottom = tar_layer(&[("version.json", Some(r#"{"version":"v1.0.0"}"#))]);
        let top = tar_layer(&[("./version.json", Some(r#"{"version":"v1.1.0"}"#))]);
        assert_eq!(read_version(&image(vec![bottom, top])).unwrap(), "v1.1.0");
    }

    #[test]
    fn test_read_version_missing() {
        let layer = tar_layer(&[("other.json", Some("{}"))]);
        assert_eq!(
            read_version(&image(vec![layer])),
            Err(ScanError::VersionFileMissing {
                file: "version.json".to_string()
            })
        );
    }

    #[test]
    fn test_read_version_rejects_directory() {
        let layer = tar_layer(&[("version.json", None)]);
        assert!(matches!(
            read_version(&image(vec![layer])),
            Err(ScanError::VersionFileMissing { .. })
        ));
    }

    #[test]
    fn test_read_version_rejects_empty_version() {
        let layer = tar_layer(&[("version.json", Some(r#"{"version":""}"#))]);
        assert!(matches!(
            read_version(&image(vec![layer])),
            Err(ScanError::VersionInvalid { .. })
        ));
    }

    #[test]
    fn test_read_version_rejects_invalid_json() {
        let layer = tar_layer(&[("version.json", Some("not json"))]);
        assert!(matches!(
            read_version(&image(vec![layer])),
            Err(ScanError::VersionInvalid { .. })
        ));
    }

    #[test]
    fn test_garbage_layer_is_a_layer_error() {
        let layer = Layer {
            media_type: String::new(),
            data: vec![0x1f, 0x8b, 0, 1, 2, 3],
        };
        assert!(matches!(
            read_version(&image(vec![layer])),
            Err(ScanError::Layer { .. })
        ));
    }

    #[test]
    fn test_module_definition() {
        let layer = tar_layer(&[("module.yaml", Some("name: console\ncritical: true\n"))]);
        assert_eq!(
            read_module_definition(&image(vec![layer])).unwrap(),
            Some(ModuleDefinition {
                name: "console".to_string(),
                critical: true,
            })
        );

        let bare = tar_layer(&[("module.yaml", Some("name: parca\n"))]);
        let definition = read_module_definition(&image(vec![bare])).unwrap().unwrap();
        assert!(!definition.critical);

        let none = tar_layer(&[("version.json", Some("{}"))]);
        assert_eq!(read_module_definition(&image(vec![none])).unwrap(), None);
    }

    #[test]
    fn test_extract_documentation_keeps_docs_only() {
        let layer = tar_layer(&[
            ("docs", None),
            ("docs/README.md", Some("# Console")),
            ("templates/deployment.yaml", Some("kind: Deployment")),
            ("openapi/config-values.yaml", Some("type: object")),
            ("crds/console.yaml", Some("kind: CustomResourceDefinition")),
            ("openapi/conversions/v2.yaml", Some("version: 2")),
        ]);

        let bundle = extract_documentation(&image(vec![gzip(layer)])).unwrap();
        assert_eq!(
            entry_names(&bundle),
            vec![
                "docs",
                "openapi",
                "openapi/conversions",
                "crds",
                "docs/README.md",
                "openapi/config-values.yaml",
                "crds/console.yaml",
                "openapi/conversions/v2.yaml",
            ]
        );
    }

    #[test]
    fn test_extract_documentation_without_docs_has_only_directories() {
        let layer = tar_layer(&[("templates/a.yaml", Some("a"))]);
        let bundle = extract_documentation(&image(vec![layer])).unwrap();
        assert_eq!(entry_names(&bundle).len(), DOCS_DIRECTORIES.len());
    }
}
