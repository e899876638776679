// Write File Step
// Places a file on each target host, optionally followed by a reload command

use crate::connector::{shell_quote, ConnectorError, ExecOptions};
use crate::inventory::Host;
use crate::step::{Step, StepContext, StepError, StepMeta, StepOutput};

use std::fmt;
use std::sync::Arc;

type Renderer = Arc<dyn Fn(&Host) -> String + Send + Sync>;

/// File body, either fixed or rendered per host
#[derive(Clone)]
pub enum FileContents {
    Static(Vec<u8>),
    Rendered(Renderer),
}

impl FileContents {
    pub fn rendered<F>(render: F) -> Self
    where
        F: Fn(&Host) -> String + Send + Sync + 'static,
    {
        Self::Rendered(Arc::new(render))
    }

    pub fn for_host(&self, host: &Host) -> Vec<u8> {
        match self {
            FileContents::Static(bytes) => bytes.clone(),
            FileContents::Rendered(render) => render(host).into_bytes(),
        }
    }
}

impl fmt::Debug for FileContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileContents::Static(bytes) => write!(f, "Static({} bytes)", bytes.len()),
            FileContents::Rendered(_) => f.write_str("Rendered"),
        }
    }
}

impl From<&str> for FileContents {
    fn from(value: &str) -> Self {
        FileContents::Static(value.as_bytes().to_vec())
    }
}

impl From<String> for FileContents {
    fn from(value: String) -> Self {
        FileContents::Static(value.into_bytes())
    }
}

/// Writes `contents` to `path`.
///
/// Up to date when the remote file already holds identical bytes; rollback
/// removes the file.
#[derive(Debug, Clone)]
pub struct WriteFileStep {
    meta: StepMeta,
    path: String,
    contents: FileContents,
    mode: u32,
    elevated: bool,
    post_command: Option<String>,
}

impl WriteFileStep {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        contents: impl Into<FileContents>,
    ) -> Self {
        let path = path.into();
        Self {
            meta: StepMeta::new(name, format!("write {}", path)),
            path,
            contents: contents.into(),
            mode: 0o644,
            elevated: false,
            post_command: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    /// Command run after the file is written (e.g. a service reload)
    pub fn then_run(mut self, command: impl Into<String>) -> Self {
        self.post_command = Some(command.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait::async_trait]
impl Step for WriteFileStep {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> Result<StepOutput, StepError> {
        let connector = ctx.connector(host)?;
        let contents = self.contents.for_host(host);
        connector
            .write_file(&contents, &self.path, self.mode, self.elevated, ctx.cancel_token())
            .await?;

        if let Some(command) = &self.post_command {
            let options = ExecOptions {
                elevated: self.elevated,
                timeout: None,
            };
            ctx.exec(host, command, &options).await?;
        }
        Ok(StepOutput::changed().with_message(format!("wrote {}", self.path)))
    }

    async fn check(&self, ctx: &StepContext, host: &Host) -> Result<bool, StepError> {
        let connector = ctx.connector(host)?;
        match connector.read_file(&self.path, ctx.cancel_token()).await {
            Ok(existing) => Ok(existing == self.contents.for_host(host)),
            Err(ConnectorError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn rollback(&self, ctx: &StepContext, host: &Host) -> Result<(), StepError> {
        let options = ExecOptions {
            elevated: self.elevated,
            timeout: None,
        };
        ctx.exec(host, &format!("rm -f {}", shell_quote(&self.path)), &options)
            .await
            .map(|_| ())
    }

    fn describe(&self, host: &Host) -> Option<String> {
        let bytes = self.contents.for_host(host).len();
        let mut text = format!("{}: write {} ({} bytes, mode {:o})", host, self.path, bytes, self.mode);
        if let Some(command) = &self.post_command {
            text.push_str(&format!(" then `{}`", command));
        }
        Some(text)
    }
}
