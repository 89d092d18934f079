use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use nous_protocol::{DeterminismClass, SideEffectClass};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::fs;
use tracing::{debug, instrument};

use crate::tool::{AtomicTool, ToolContext, ToolHandler, ToolPermission, ToolSource};

pub const FS_READ: &str = "fs.read";
pub const FS_WRITE: &str = "fs.write";

pub(crate) fn core_tools() -> Vec<AtomicTool> {
    let mut read = AtomicTool::new(FS_READ, "Read a UTF-8 text file from the working directory")
        .with_source(ToolSource::Builtin)
        .with_permissions([ToolPermission::FsRead])
        .with_tags(["fs"])
        .with_input_schema(schema(&[("path", true)]))
        .bind(FsRead);
    read.determinism = DeterminismClass::External;
    read.side_effects = SideEffectClass::Pure;

    let mut write = AtomicTool::new(FS_WRITE, "Write a UTF-8 text file into the working directory")
        .with_source(ToolSource::Builtin)
        .with_permissions([ToolPermission::FsWrite])
        .with_tags(["fs"])
        .with_input_schema(schema(&[("path", true), ("content", true), ("append", false)]))
        .bind(FsWrite);
    write.determinism = DeterminismClass::External;

    vec![read, write]
}

fn schema(fields: &[(&str, bool)]) -> Map<String, Value> {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|(name, _)| {
            let kind = if *name == "append" { "boolean" } else { "string" };
            ((*name).to_owned(), json!({ "type": kind }))
        })
        .collect();
    let required: Vec<&str> = fields
        .iter()
        .filter(|(_, required)| *required)
        .map(|(name, _)| *name)
        .collect();
    let mut schema = Map::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), Value::Object(properties));
    schema.insert("required".into(), json!(required));
    schema
}

#[derive(Debug, Deserialize)]
struct ReadInput {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteInput {
    path: String,
    content: String,
    #[serde(default)]
    append: bool,
}

fn parse<T: for<'de> Deserialize<'de>>(tool: &str, input: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(input)).with_context(|| format!("invalid {tool} input"))
}

struct FsRead;

#[async_trait]
impl ToolHandler for FsRead {
    #[instrument(skip_all, fields(tool = FS_READ))]
    async fn call(&self, input: Map<String, Value>, context: &ToolContext) -> Result<Value> {
        let ReadInput { path } = parse(FS_READ, input)?;
        let target = Sandbox::for_context(context)?.resolve(&path)?;
        let content = fs::read_to_string(&target)
            .await
            .with_context(|| format!("{FS_READ}: cannot read {}", target.display()))?;
        debug!(bytes = content.len(), "file read");
        Ok(json!({ "path": path, "bytes": content.len(), "content": content }))
    }
}

struct FsWrite;

#[async_trait]
impl ToolHandler for FsWrite {
    #[instrument(skip_all, fields(tool = FS_WRITE))]
    async fn call(&self, input: Map<String, Value>, context: &ToolContext) -> Result<Value> {
        let WriteInput {
            path,
            content,
            append,
        } = parse(FS_WRITE, input)?;
        let target = Sandbox::for_context(context)?.resolve(&path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        if append {
            use tokio::io::AsyncWriteExt;
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&target)
                .await
                .with_context(|| format!("{FS_WRITE}: cannot open {}", target.display()))?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
        } else {
            fs::write(&target, &content)
                .await
                .with_context(|| format!("{FS_WRITE}: cannot write {}", target.display()))?;
        }
        debug!(bytes = content.len(), append, "file written");
        Ok(json!({ "path": path, "bytes": content.len(), "append": append }))
    }
}

/// Confines tool paths to the agent's working directory.
///
/// Paths are normalized lexically first, so `..` can never climb above the
/// root even when the intermediate directories do not exist yet. The deepest
/// existing ancestor is then canonicalized to catch symlinks that point out.
struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    fn for_context(context: &ToolContext) -> Result<Self> {
        let root = context
            .working_directory
            .as_deref()
            .context("filesystem tools require a working directory")?;
        Ok(Self {
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
        })
    }

    fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let mut relative = PathBuf::new();
        for component in Path::new(requested).components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir => {
                    if !relative.pop() {
                        bail!("path escapes working directory: {requested}");
                    }
                }
                Component::Prefix(_) => bail!("path prefixes are not allowed: {requested}"),
            }
        }
        if relative.as_os_str().is_empty() {
            bail!("path names the working directory itself: {requested:?}");
        }

        let target = self.root.join(&relative);
        let existing = target
            .ancestors()
            .find(|ancestor| ancestor.exists())
            .unwrap_or(self.root.as_path());
        let resolved = existing
            .canonicalize()
            .with_context(|| format!("cannot resolve {}", existing.display()))?;
        if !resolved.starts_with(&self.root) {
            bail!("path escapes working directory: {requested}");
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::unique_test_root;

    fn input(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn sandbox(name: &str) -> (Sandbox, PathBuf) {
        let root = unique_test_root(name);
        std::fs::create_dir_all(&root).unwrap();
        let ctx = ToolContext::new("agent").with_working_directory(&root);
        (Sandbox::for_context(&ctx).unwrap(), root)
    }

    #[tokio::test]
    async fn write_append_then_read_inside_working_directory() -> anyhow::Result<()> {
        let root = unique_test_root("nous-tools-fs");
        std::fs::create_dir_all(&root)?;
        let ctx = ToolContext::new("agent").with_working_directory(&root);
        let tools = core_tools();

        let written = tools[1]
            .execute(input(json!({"path": "notes/a.txt", "content": "hello"})), &ctx)
            .await?;
        assert_eq!(written["bytes"], 5);
        tools[1]
            .execute(
                input(json!({"path": "notes/a.txt", "content": " world", "append": true})),
                &ctx,
            )
            .await?;

        let read = tools[0]
            .execute(input(json!({"path": "/notes/./a.txt"})), &ctx)
            .await?;
        assert_eq!(read["content"], "hello world");
        assert_eq!(read["bytes"], 11);

        let _ = std::fs::remove_dir_all(root);
        Ok(())
    }

    #[test]
    fn parent_components_cannot_leave_the_root() {
        let (sandbox, root) = sandbox("nous-tools-escape");
        assert!(sandbox.resolve("../outside.txt").is_err());
        assert!(sandbox.resolve("missing/../../x").is_err());
        assert!(sandbox.resolve(".").is_err());
        assert_eq!(
            sandbox.resolve("a/../b/c.txt").unwrap(),
            sandbox.root.join("b/c.txt")
        );
        let _ = std::fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_pointing_outside_are_refused() {
        let (sandbox, root) = sandbox("nous-tools-symlink");
        let outside = unique_test_root("nous-tools-outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        assert!(sandbox.resolve("link/secret.txt").is_err());
        let _ = std::fs::remove_dir_all(root);
        let _ = std::fs::remove_dir_all(outside);
    }

    #[tokio::test]
    async fn bad_input_and_missing_directory_are_execution_errors() {
        let tools = core_tools();
        let ctx = ToolContext::new("agent");
        let err = tools[0]
            .execute(input(json!({"path": "a.txt"})), &ctx)
            .await
            .unwrap_err();
        assert!(format!("{:#}", anyhow::Error::from(err)).contains("working directory"));

        let err = tools[1]
            .execute(input(json!({"path": "a.txt"})), &ctx)
            .await
            .unwrap_err();
        assert!(format!("{:#}", anyhow::Error::from(err)).contains("invalid fs.write input"));
    }

    #[test]
    fn core_tools_declare_permissions_and_schema() {
        let tools = core_tools();
        assert_eq!(tools[0].name, FS_READ);
        assert_eq!(tools[0].permissions, vec![ToolPermission::FsRead]);
        assert_eq!(tools[1].permissions, vec![ToolPermission::FsWrite]);
        assert_eq!(tools[1].input_schema["required"], json!(["path", "content"]));
        assert_eq!(tools[1].input_schema["properties"]["append"]["type"], "boolean");
        assert!(tools.iter().all(AtomicTool::is_bound));
    }
}
