use std::sync::Arc;
use tempfile::NamedTempFile;
use woodie_logger::{
    fields, init_tracing, Call, FileHandler, JsonFormatter, Level, StreamHandler,
    StructuredLogger, TextFormatter, TracingConfig, TracingHandler,
};

fn main() {
    println!("=== woodie 结构化日志示例 ===\n");

    // 1. 初始化 tracing，TracingHandler 的输出由它负责
    println!("1. 初始化 tracing 订阅器");
    init_tracing(&TracingConfig::default()).unwrap();
    println!("订阅器已安装\n");

    // 2. 多个处理器：控制台文本 + 文件 JSON + tracing
    println!("2. 构建日志器");
    let temp_file = NamedTempFile::new().unwrap();
    let log_path = temp_file.path().to_path_buf();

    let console = Arc::new(StreamHandler::stdout());
    let file = Arc::new(FileHandler::open(&log_path).unwrap());
    let tracing_handler = Arc::new(TracingHandler::new().with_level(Level::WARN));

    let logger = StructuredLogger::builder("demo.api")
        .level("debug")
        .fields(fields! { "service" => "demo", "env" => "development" })
        .handler(console)
        .handler_with_formatter(file, Arc::new(JsonFormatter::new()))
        .handler_with_formatter(
            tracing_handler,
            Arc::new(TextFormatter::new("{name}: {message} {fields}").unwrap()),
        )
        .build()
        .unwrap();
    println!("日志器 `{}` 共 {} 个处理器\n", logger.name(), logger.handlers().len());

    // 3. 持久字段、extra 与调用字段
    println!("3. 字段合并");
    logger
        .info("用户登录成功", Call::new().extra(fields! { "user_id" => "user-123" }))
        .unwrap();
    logger.add_fields(fields! { "request_id" => "req-42" });
    logger
        .warn(
            "请求耗时 %d ms",
            Call::new().arg(1250).field("path", "/api/orders"),
        )
        .unwrap();
    println!();

    // 4. 附带错误
    println!("4. 异常日志");
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "config.toml missing");
    logger
        .exception("加载配置失败", Call::new().error(&io_error))
        .unwrap();
    println!();

    // 5. 日志调用本身失败：先发兜底记录，再把错误交还调用方
    println!("5. 失败兜底");
    match logger.info("参数不足 %s %s", Call::new().arg("only-one")) {
        Ok(()) => println!("  意外成功"),
        Err(e) => {
            println!("  调用方收到错误: {}", e);
            println!("  兜底记录: {:?}", e.fallback());
        }
    }
    println!();

    // 6. 文件中的 JSON 记录
    println!("6. 文件内容");
    let content = std::fs::read_to_string(&log_path).unwrap();
    for line in content.lines() {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(line) {
            println!("  {} {}", parsed["level"], parsed["message"]);
        }
    }

    println!("\n=== 示例完成 ===");
}
