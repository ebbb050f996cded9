//! # 美化输出工具
//!
//! 统一的终端输出样式：带前缀的单行消息、标题栏、以及 80 列的框线消息。
//!
//! ## 依赖关系
//! - 被 `batch/`、`commands/`、`main.rs` 使用
//! - 使用 `colored` crate

use colored::Colorize;

const FRAME_WIDTH: usize = 80;

/// 打印成功消息
pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

/// 打印错误消息
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERR]".red().bold(), msg);
}

/// 打印警告消息
pub fn print_warning(msg: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), msg);
}

/// 打印信息消息
pub fn print_info(msg: &str) {
    println!("{} {}", "[*]".blue().bold(), msg);
}

/// 打印完成消息
pub fn print_done(msg: &str) {
    println!("{} {}", "[DONE]".green().bold(), msg);
}

/// 打印标题栏
pub fn print_header(title: &str) {
    let line = "─".repeat(60);
    println!("\n{}", line.dimmed());
    println!("  {}", title.bold());
    println!("{}\n", line.dimmed());
}

/// 打印分隔线
pub fn print_separator() {
    println!("{}", "─".repeat(60).dimmed());
}

/// 框线消息的纯文本内容，段落之间空一行
pub fn framed_text(title: &str, lines: &[&str]) -> String {
    let rule = "-".repeat(FRAME_WIDTH);
    let mut text = format!("{}\n\n{}\n\n", rule, title);
    for line in lines {
        text.push_str(line);
        text.push_str("\n\n");
    }
    text.push_str(&rule);
    text
}

/// 打印框线消息（警告写到 stdout）
pub fn print_framed(title: &str, lines: &[&str]) {
    let text = framed_text(title, lines);
    match title {
        "WARNING" => println!("{}", text.yellow()),
        _ => println!("{}", text),
    }
}

/// 打印致命错误框（stderr）
pub fn print_critical(message: &str, hints: &[String]) {
    let mut lines: Vec<&str> = vec![message];
    lines.extend(hints.iter().map(String::as_str));
    eprintln!("{}", framed_text("CRITICAL ERROR", &lines).red());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framed_text_layout() {
        let text = framed_text("WARNING", &["first", "second"]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0].len(), 80);
        assert_eq!(lines[2], "WARNING");
        assert_eq!(lines[4], "first");
        assert_eq!(lines[6], "second");
        assert_eq!(lines.last().unwrap().len(), 80);
    }
}
