// Output sinks: the result tree serialized into one file per configured
// format, with an optional named transform applied first.

use anyhow::{bail, Context};
use harrow_engine::config::OutputConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Yaml => "yml",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

/// One concrete file to produce, resolved from the `output` section.
#[derive(Debug, Clone)]
pub struct ResolvedOutput {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub transform: Option<String>,
}

/// Expand the `output` section into concrete sink targets. Unknown
/// format names are a hard error rather than a skipped file.
pub fn resolve_outputs(output: &OutputConfig) -> anyhow::Result<Vec<ResolvedOutput>> {
    let mut resolved = Vec::with_capacity(output.formats.len());

    for spec in &output.formats {
        let Some(format) = OutputFormat::from_str(spec.kind()) else {
            bail!("unknown output format: {}", spec.kind());
        };
        let file = format!("{}.{}", output.name, format.extension());
        resolved.push(ResolvedOutput {
            path: Path::new(&output.path).join(file),
            format,
            transform: spec.transform().map(str::to_string),
        });
    }

    Ok(resolved)
}

/// A named reshaping step applied to the result tree before
/// serialization. Returning `None` means the transform wrote the file
/// itself and the default serializer should stay out of the way.
pub trait SinkTransform: Send + Sync {
    fn apply(&self, data: &Value, output: &ResolvedOutput) -> anyhow::Result<Option<Value>>;
}

#[derive(Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Box<dyn SinkTransform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        TransformRegistry::default()
    }

    pub fn register(mut self, name: &str, transform: Box<dyn SinkTransform>) -> Self {
        self.transforms.insert(name.to_string(), transform);
        self
    }

    fn get(&self, name: &str) -> Option<&dyn SinkTransform> {
        self.transforms.get(name).map(|t| t.as_ref())
    }
}

/// Write the result tree to every resolved output, returning the paths
/// actually produced.
pub fn write_outputs(
    data: &Value,
    outputs: &[ResolvedOutput],
    registry: &TransformRegistry,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(outputs.len());

    for output in outputs {
        let payload = match &output.transform {
            Some(name) => {
                let Some(transform) = registry.get(name) else {
                    bail!("unknown output transform: {}", name);
                };
                match transform.apply(data, output)? {
                    Some(reshaped) => reshaped,
                    None => {
                        written.push(output.path.clone());
                        continue;
                    }
                }
            }
            None => data.clone(),
        };

        write_one(&payload, output)?;
        info!(path = %output.path.display(), "wrote output");
        written.push(output.path.clone());
    }

    Ok(written)
}

fn write_one(data: &Value, output: &ResolvedOutput) -> anyhow::Result<()> {
    if let Some(parent) = output.path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }

    let rendered = match output.format {
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
        OutputFormat::Json => {
            let mut s = serde_json::to_string_pretty(data)?;
            s.push('\n');
            s
        }
        OutputFormat::Csv => to_csv(data),
    };

    fs::write(&output.path, rendered)
        .with_context(|| format!("writing {}", output.path.display()))?;
    Ok(())
}

/// Tabular rendition of the tree. An array of objects becomes rows under
/// a header made of every key in first-seen order; anything else
/// flattens to `path,value` pairs.
fn to_csv(data: &Value) -> String {
    let rows = match data {
        Value::Array(items) if items.iter().all(|i| i.is_object()) && !items.is_empty() => {
            items.clone()
        }
        Value::Object(map) => {
            // A single top-level array of objects is the common shape for
            // collected records; use it as the table.
            let tables: Vec<&Value> = map
                .values()
                .filter(|v| {
                    matches!(v, Value::Array(items) if !items.is_empty()
                        && items.iter().all(|i| i.is_object()))
                })
                .collect();
            match tables.as_slice() {
                [Value::Array(items)] => items.clone(),
                _ => return flat_csv(data),
            }
        }
        _ => return flat_csv(data),
    };

    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let mut out = String::new();
    out.push_str(&columns.iter().map(|c| escape_csv(c)).collect::<Vec<_>>().join(","));
    out.push('\n');

    for row in &rows {
        let Value::Object(map) = row else { continue };
        let cells: Vec<String> = columns
            .iter()
            .map(|c| escape_csv(&cell_text(map.get(c).unwrap_or(&Value::Null))))
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }

    out
}

fn flat_csv(data: &Value) -> String {
    let mut pairs = Vec::new();
    flatten_into("", data, &mut pairs);

    let mut out = String::from("path,value\n");
    for (path, value) in pairs {
        out.push_str(&format!("{},{}\n", escape_csv(&path), escape_csv(&value)));
    }
    out
}

fn flatten_into(prefix: &str, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(&path, v, pairs);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(&format!("{}[{}]", prefix, i), v, pairs);
            }
        }
        scalar => pairs.push((prefix.to_string(), cell_text(scalar))),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harrow_engine::config::OutputFormatSpec;
    use serde_json::json;

    fn output_config(yaml: &str) -> OutputConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn resolves_paths_from_name_and_format() {
        let config = output_config(
            r#"
path: /tmp/out
name: listings
formats: [json, yaml]
"#,
        );
        let outputs = resolve_outputs(&config).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].path, PathBuf::from("/tmp/out/listings.json"));
        assert_eq!(outputs[1].path, PathBuf::from("/tmp/out/listings.yml"));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let config = OutputConfig {
            formats: vec![OutputFormatSpec::Name("xlsx".into())],
            ..OutputConfig::default()
        };
        assert!(resolve_outputs(&config).is_err());
    }

    #[test]
    fn csv_tables_an_array_of_objects() {
        let data = json!({"rows": [
            {"name": "a", "price": 1},
            {"name": "b, c", "stock": 4},
        ]});
        let csv = to_csv(&data);
        assert_eq!(csv, "name,price,stock\na,1,\n\"b, c\",,4\n");
    }

    #[test]
    fn csv_falls_back_to_flat_paths() {
        let data = json!({"site": {"title": "T"}, "count": 2});
        let csv = to_csv(&data);
        assert!(csv.starts_with("path,value\n"));
        assert!(csv.contains("site.title,T\n"));
        assert!(csv.contains("count,2\n"));
    }

    #[test]
    fn writes_every_format() {
        let dir = tempfile::tempdir().unwrap();
        let config = output_config(&format!(
            "path: {}\nname: result\nformats: [json, yaml, csv]\n",
            dir.path().display()
        ));
        let outputs = resolve_outputs(&config).unwrap();
        let data = json!({"items": [{"k": "v"}]});

        let written = write_outputs(&data, &outputs, &TransformRegistry::new()).unwrap();
        assert_eq!(written.len(), 3);
        for path in &written {
            assert!(path.exists(), "missing {}", path.display());
        }

        let json: Value =
            serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(json, data);
    }

    struct Upper;

    impl SinkTransform for Upper {
        fn apply(&self, data: &Value, _output: &ResolvedOutput) -> anyhow::Result<Option<Value>> {
            let Value::Object(map) = data else {
                return Ok(Some(data.clone()));
            };
            let upper = map
                .iter()
                .map(|(k, v)| (k.to_uppercase(), v.clone()))
                .collect();
            Ok(Some(Value::Object(upper)))
        }
    }

    #[test]
    fn named_transform_reshapes_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let config = output_config(&format!(
            "path: {}\nname: result\nformats: [{{type: json, transform: upper}}]\n",
            dir.path().display()
        ));
        let outputs = resolve_outputs(&config).unwrap();
        let registry = TransformRegistry::new().register("upper", Box::new(Upper));

        let written =
            write_outputs(&json!({"a": 1}), &outputs, &registry).unwrap();
        let json: Value =
            serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(json, json!({"A": 1}));
    }

    #[test]
    fn missing_transform_is_an_error() {
        let outputs = vec![ResolvedOutput {
            path: PathBuf::from("/tmp/never.json"),
            format: OutputFormat::Json,
            transform: Some("ghost".into()),
        }];
        assert!(write_outputs(&json!({}), &outputs, &TransformRegistry::new()).is_err());
    }
}
