use afip_fe::config::toml_config::LogFormat;
use afip_fe::domain::model::{SaleSnapshot, TenantProfile};
use afip_fe::domain::services::document_validator::{classify_tax_id, format_tax_id};
use afip_fe::domain::services::qr_builder;
use afip_fe::utils::error::{ErrorSeverity, InvoicingError, Result};
use afip_fe::utils::{logger, validation::Validate};
use afip_fe::{
    tenant_from_config, validate_tax_id, CliConfig, Command, JsonFileOutcomeStore, Orchestrator,
    TomlConfig, WsfeClient,
};
use clap::Parser;

type CliOrchestrator = Orchestrator<WsfeClient, JsonFileOutcomeStore>;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // validate-cuit 不需要設定檔
    if let Command::ValidateCuit { value } = &cli.command {
        logger::init_cli_logger(cli.verbose);
        std::process::exit(validate_cuit(value));
    }

    let config = match TomlConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(cli.verbose);
            fail(e);
        }
    };

    // 初始化日誌
    match config.log_format() {
        LogFormat::Text => logger::init_cli_logger(cli.verbose),
        LogFormat::Json => logger::init_json_logger(cli.verbose),
    }

    tracing::info!("Starting afip-fe CLI");
    if cli.verbose {
        tracing::debug!("CLI args: {:?}", cli);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        fail(e);
    }

    let tenant = match tenant_from_config(&config) {
        Ok(tenant) => tenant,
        Err(e) => fail(e),
    };
    let store = JsonFileOutcomeStore::new(config.outcome_path());
    let orchestrator = Orchestrator::from_config(&config, store);

    if let Err(e) = run(cli.command, &orchestrator, &tenant).await {
        fail(e);
    }
}

async fn run(command: Command, orchestrator: &CliOrchestrator, tenant: &TenantProfile) -> Result<()> {
    match command {
        Command::Status => {
            let status = orchestrator.server_status().await;
            println!("AppServer:  {:?}", status.app_server);
            println!("DbServer:   {:?}", status.db_server);
            println!("AuthServer: {:?}", status.auth_server);
            if !status.is_healthy() {
                tracing::warn!("⚠️ Invoicing service reports degraded components");
            }
        }
        Command::LastNumber { invoice_type, point } => {
            let point = point.unwrap_or(tenant.default_sale_point);
            let last = orchestrator.last_number(tenant, invoice_type, point).await?;
            println!("{}", last);
        }
        Command::Authorize { sale, qr_svg } => {
            let content = std::fs::read(&sale)?;
            let snapshot: SaleSnapshot = serde_json::from_slice(&content)?;
            let result = orchestrator.authorize_invoice(tenant, &snapshot).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let (Some(path), Some(url)) = (qr_svg, result.qr_url.as_deref()) {
                std::fs::write(&path, qr_builder::render_svg(url)?)?;
                tracing::info!("🧾 QR code written to {}", path.display());
            }
            if !result.success {
                for error in &result.errors {
                    eprintln!("❌ {}", error);
                }
                std::process::exit(1);
            }
        }
        Command::Query { invoice_type, point, number } => {
            let point = point.unwrap_or(tenant.default_sale_point);
            match orchestrator.query(tenant, invoice_type, point, number).await? {
                Some(record) => println!("{:#?}", record),
                None => {
                    println!("Invoice not found");
                    std::process::exit(4);
                }
            }
        }
        Command::Reconcile { invoice_type, point, number, sale_id } => {
            let point = point.unwrap_or(tenant.default_sale_point);
            match orchestrator
                .reconcile(tenant, invoice_type, point, number, sale_id.as_deref())
                .await?
            {
                Some(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
                None => {
                    println!("No authorized invoice at that number; it is safe to resubmit");
                    std::process::exit(4);
                }
            }
        }
        Command::SalePoints => {
            for point in orchestrator.sale_points(tenant).await? {
                let state = if point.blocked { "blocked" } else { "active" };
                match point.deactivated_on {
                    Some(date) => println!("{:05}  {}  {}  deactivated {}", point.number, point.emission_type, state, date),
                    None => println!("{:05}  {}  {}", point.number, point.emission_type, state),
                }
            }
        }
        Command::ValidateCuit { value } => {
            std::process::exit(validate_cuit(&value));
        }
    }
    Ok(())
}

fn validate_cuit(value: &str) -> i32 {
    if validate_tax_id(value) {
        println!("✅ {} is valid ({:?})", format_tax_id(value), classify_tax_id(value));
        0
    } else {
        println!("❌ {} is not a valid CUIT/CUIL", value);
        1
    }
}

fn fail(e: InvoicingError) -> ! {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ Operation failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    // 輸出用戶友好的錯誤信息
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,      // 已授權等冪等情況
        ErrorSeverity::Medium => 2,   // 可重試
        ErrorSeverity::High => 1,     // 輸入錯誤
        ErrorSeverity::Critical => 3, // 系統錯誤
    };
    std::process::exit(exit_code);
}
