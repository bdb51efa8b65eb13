//! CLI commands.
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;
use crate::device::AdbDevice;
use crate::errors::{DroidLensError, DroidLensResult};
use crate::executor::coordinator::DeviceHandle;
use crate::perception::element::AppElement;
use crate::perception::hierarchy::Hierarchy;
use crate::perception::xpath;

#[derive(Debug, Parser)]
#[command(name = "droidlens")]
#[command(about = "Inspect and tap Android UI elements through uiautomator dumps")]
#[command(version)]
pub struct Cli {
    /// Config file to use instead of the default search path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Capture the current view hierarchy from the device
    Dump {
        /// Write the dump to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print matching elements as JSON
    Find {
        /// Query a saved dump instead of capturing from the device
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[command(flatten)]
        selector: Selector,
    },
    /// Tap the centre of a matching element
    Tap {
        #[command(flatten)]
        selector: Selector,

        /// Which match to tap, counting from 0 in document order
        #[arg(long, default_value_t = 0)]
        nth: usize,
    },
}

#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct Selector {
    /// Match the `index` attribute
    #[arg(long)]
    pub id: Option<String>,
    /// Match the `class` attribute
    #[arg(long)]
    pub class: Option<String>,
    /// Match the `text` attribute
    #[arg(long)]
    pub text: Option<String>,
    /// Match the `resource-id` attribute
    #[arg(long)]
    pub resource_id: Option<String>,
    /// Match the `content-desc` attribute
    #[arg(long)]
    pub content_desc: Option<String>,
    /// Arbitrary XPath expression
    #[arg(long)]
    pub xpath: Option<String>,
}

impl Selector {
    /// The query this selector runs.
    pub fn expression(&self) -> DroidLensResult<String> {
        if let Some(expr) = &self.xpath {
            return Ok(expr.clone());
        }
        let pairs = [
            ("index", &self.id),
            ("class", &self.class),
            ("text", &self.text),
            ("resource-id", &self.resource_id),
            ("content-desc", &self.content_desc),
        ];
        pairs
            .iter()
            .find_map(|(attr, value)| {
                value
                    .as_deref()
                    .map(|v| xpath::attribute_equals(attr, v))
            })
            .ok_or_else(|| DroidLensError::Config("no selector given".into()))
    }

    pub fn find(&self, hierarchy: &Hierarchy) -> DroidLensResult<Vec<AppElement>> {
        hierarchy.find_by_query(&self.expression()?)
    }
}

pub async fn execute(cli: Cli, config: AppConfig) -> DroidLensResult<()> {
    match cli.command {
        Commands::Dump { out } => dump(&config, out).await,
        Commands::Find { file, selector } => find(&config, file, &selector).await,
        Commands::Tap { selector, nth } => tap(&config, &selector, nth).await,
    }
}

async fn dump(config: &AppConfig, out: Option<PathBuf>) -> DroidLensResult<()> {
    let device = AdbDevice::new(&config.device);
    let hierarchy = Hierarchy::capture(&device, None).await?;
    match out {
        Some(path) => {
            tokio::fs::write(&path, hierarchy.xml()).await?;
            tracing::info!(path = %path.display(), "dump written");
        }
        None => println!("{}", hierarchy.xml()),
    }
    Ok(())
}

async fn find(
    config: &AppConfig,
    file: Option<PathBuf>,
    selector: &Selector,
) -> DroidLensResult<()> {
    let hierarchy = match file {
        Some(path) => Hierarchy::parse(tokio::fs::read_to_string(&path).await?)?,
        None => Hierarchy::capture(&AdbDevice::new(&config.device), None).await?,
    };
    let elements = selector.find(&hierarchy)?;
    println!("{}", serde_json::to_string_pretty(&elements)?);
    Ok(())
}

async fn tap(config: &AppConfig, selector: &Selector, nth: usize) -> DroidLensResult<()> {
    let device = Arc::new(AdbDevice::new(&config.device));
    let handle = DeviceHandle::new(device.clone(), config.tap.clone());
    let hierarchy = Hierarchy::capture(device.as_ref(), Some(handle)).await?;

    let expression = selector.expression()?;
    let mut elements = hierarchy.find_by_query(&expression)?;
    if nth >= elements.len() {
        return Err(DroidLensError::NotFound(format!(
            "{expression} at position {nth} ({} match(es))",
            elements.len()
        )));
    }
    let element = elements.swap_remove(nth);
    let result = element.tap().await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
