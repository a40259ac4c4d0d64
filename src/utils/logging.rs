/// 日志工具模块
///
/// 提供日志初始化、格式化输出和进度条的辅助函数
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化日志
///
/// 默认级别为 info，可通过 `RUST_LOG` 覆盖；重复调用不会报错
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 问答配对与答案生成");
    info!("📁 源文件: {}", config.source_path);
    info!("💾 检查点: {}", config.snapshot_path);
    info!("📊 最大并发数: {}", config.concurrency);
    info!("{}", "=".repeat(60));
}

/// 记录阶段开始
pub fn log_stage(stage: &str) {
    info!("\n{}", "─".repeat(60));
    info!("📦 {}", stage);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `pairs`: 输出的问答对数量
/// - `answered`: 已生成答案的数量
/// - `output_path`: 输出文件路径
pub fn print_final_stats(pairs: usize, answered: usize, output_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 已生成答案: {}/{}", answered, pairs);
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", output_path);
}

/// 创建读取进度条
///
/// `total` 为 0 时显示计数器；总数只用于显示，不影响读取
pub fn progress_bar(title: &str, total: u64) -> ProgressBar {
    let bar = if total > 0 {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>9}/{len:9} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar
    };
    bar.set_message(title.to_string());
    bar
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
