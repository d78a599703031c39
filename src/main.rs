mod config;
mod fetcher;
mod ocr;
mod parser;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{AppConfig, ReportTemplate, DEFAULT_CONFIG_PATH, DEFAULT_TEMPLATE_PATH};
use crate::fetcher::ImageFetcher;
use crate::ocr::{OcrMode, Region};
use crate::parser::{image_loader, ReportDocument, ReportExtractor};
use crate::utils::logger;

const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Parser)]
#[command(name = "bodyscan")]
#[command(about = "体成分分析报告图片字段提取", long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 生成默认配置和模板
    Init,
    /// 从报告图片提取字段
    Extract {
        /// 本地图片 (.jpg/.jpeg/.png)
        #[arg(required_unless_present = "url", conflicts_with = "url")]
        image: Option<PathBuf>,
        /// 远程图片地址
        #[arg(long)]
        url: Option<String>,
        /// 结果写入文件而不是标准输出
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 单行 JSON
        #[arg(long)]
        compact: bool,
    },
    /// 打印当前生效的模板
    Template,
    /// 识别单个区域，用于校准模板坐标
    Probe {
        image: PathBuf,
        #[arg(long)]
        x: u32,
        #[arg(long)]
        y: u32,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(long, value_enum, default_value_t = OcrMode::Block)]
        mode: OcrMode,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logger();

    let cli = Cli::parse();
    let app_config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("加载配置失败: {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => {
            init_command(&app_config).await?;
        }
        Commands::Extract { image, url, output, compact } => {
            let result = extract_command(&app_config, image, url).await;
            match result {
                Ok(document) => write_document(&document, output.as_deref(), !compact).await?,
                Err(e) => {
                    let body = serde_json::json!({ "error": format!("Error processing image: {:#}", e) });
                    println!("{}", body);
                    return Err(e);
                }
            }
        }
        Commands::Template => {
            let template = app_config.load_template()?;
            print!("{}", template.to_toml()?);
        }
        Commands::Probe { image, x, y, width, height, mode } => {
            probe_command(&app_config, &image, Region::new(x, y, width, height), mode)?;
        }
    }

    Ok(())
}

async fn init_command(app_config: &AppConfig) -> Result<()> {
    info!("初始化配置...");
    tokio::fs::create_dir_all("config").await?;

    app_config.save(DEFAULT_CONFIG_PATH)?;
    info!("已生成配置文件: {}", DEFAULT_CONFIG_PATH);

    ReportTemplate::default().save(DEFAULT_TEMPLATE_PATH)?;
    info!("已生成模板: {}", DEFAULT_TEMPLATE_PATH);

    info!("下一步:");
    info!("  1. 在 {} 中设置 tesseract_cmd", DEFAULT_CONFIG_PATH);
    info!("  2. 如需调整坐标，编辑模板并设置 extraction.template_path");
    info!("  3. 运行 'bodyscan extract <图片>'");
    Ok(())
}

async fn extract_command(app_config: &AppConfig, image: Option<PathBuf>, url: Option<String>) -> Result<ReportDocument> {
    let extractor = ReportExtractor::from_config(app_config)?;

    let document = match (image, url) {
        (Some(path), _) => {
            check_extension(&path)?;
            tokio::task::spawn_blocking(move || extractor.extract_path(&path)).await??
        }
        (None, Some(url)) => {
            let downloader = ImageFetcher::new(&app_config.fetch)?;
            let bytes = downloader.fetch(&url).await?;
            let name = fetcher::source_name(&url);
            tokio::task::spawn_blocking(move || extractor.extract_bytes(&bytes, &name)).await??
        }
        (None, None) => anyhow::bail!("需要提供图片路径或 --url"),
    };

    Ok(document)
}

fn check_extension(path: &Path) -> Result<()> {
    let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false);
    if !supported {
        anyhow::bail!("只支持图片文件 (.jpg, .jpeg, .png): {}", path.display());
    }
    Ok(())
}

async fn write_document(document: &ReportDocument, output: Option<&Path>, pretty: bool) -> Result<()> {
    let text = document.to_response(pretty)?;
    match output {
        Some(path) => {
            tokio::fs::write(path, format!("{}\n", text)).await?;
            info!("✅ 结果已写入: {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn probe_command(app_config: &AppConfig, image: &Path, region: Region, mode: OcrMode) -> Result<()> {
    let extractor = ReportExtractor::from_config(app_config)?;
    let gray = image_loader::load_grayscale(image)?;
    let text = extractor.read_region(&gray, region, mode);
    info!("区域 {:?} ({})", region, mode);
    println!("{}", text);
    Ok(())
}
