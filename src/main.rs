use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use contract_triage::config::TriageConfig;
use contract_triage::extract::PlainTextDecoder;
use contract_triage::mailbox::{InMemoryMailbox, Mailbox};
use contract_triage::matching::{Contract, InMemoryRegistry};
use contract_triage::message::RawMessage;
use contract_triage::pipeline::{CoordinatorDeps, LoggingSink, PipelineCoordinator};
use contract_triage::store::InMemoryRunStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(TriageConfig::from_env());
    config.validate()?;

    let poll_interval_secs: u64 = std::env::var("TRIAGE_POLL_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);

    eprintln!("📬 Contract Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Poll interval: {poll_interval_secs}s");
    eprintln!("   Escalation department: {}", config.priority_escalation_department);
    eprintln!("   Retry ceiling: {}\n", config.max_retry_count);

    // Demo collaborators: a seeded registry and mailbox stand in for the
    // real external services.
    let registry = Arc::new(InMemoryRegistry::new(demo_contracts()));
    let mailbox = InMemoryMailbox::new(demo_messages());

    let deps = CoordinatorDeps {
        decoder: Arc::new(PlainTextDecoder),
        registry,
        store: Arc::new(InMemoryRunStore::new()),
        sink: Arc::new(LoggingSink),
    };
    let coordinator = PipelineCoordinator::new(config, deps)?;

    loop {
        let decisions = coordinator.poll_once(&mailbox).await;
        for decision in &decisions {
            println!(
                "{} -> {} (priority {}, contract {}, rationale [{}])",
                decision.message_id,
                decision.department,
                decision.priority,
                decision.contract_id.as_deref().unwrap_or("none"),
                decision
                    .rationale
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }

        if mailbox.fetch_unprocessed().await?.is_empty() {
            eprintln!("\nMailbox drained — exiting demo loop.");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(poll_interval_secs)).await;
    }
}

fn demo_contracts() -> Vec<Contract> {
    vec![
        Contract {
            id: "2024-0452".into(),
            school_name: "Colégio Anchieta".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 2, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 31),
            value: Some(Decimal::new(500_000, 2)),
            updated_at: Utc::now(),
        },
        Contract {
            id: "2023-0117".into(),
            school_name: "Escola Municipal João da Silva".into(),
            start_date: NaiveDate::from_ymd_opt(2023, 6, 1),
            end_date: NaiveDate::from_ymd_opt(2026, 5, 31),
            value: Some(Decimal::new(300_000, 2)),
            updated_at: Utc::now(),
        },
    ]
}

fn demo_messages() -> Vec<RawMessage> {
    vec![
        RawMessage {
            id: "demo-renewal".into(),
            sender: "maria@anchieta.edu.br".into(),
            sender_name: Some("Maria Oliveira".into()),
            subject: Some("Renovação contrato 2024-0452".into()),
            body: "Prezados,\n\nSolicito a renovação do contrato do Colégio Anchieta.\n\
                   O contrato atual vence em breve e gostaríamos de renová-lo por mais \
                   12 meses, mantendo o valor de R$ 5.000,00.\n\nAtenciosamente,\nMaria"
                .into(),
            attachments: vec![],
            received_at: Utc::now(),
        },
        RawMessage {
            id: "demo-payment".into(),
            sender: "financeiro@joaodasilva.edu.br".into(),
            sender_name: None,
            subject: Some("Fatura em aberto".into()),
            body: "Bom dia,\n\nIdentificamos uma cobrança em duplicidade na fatura do \
                   contrato 2023-0117, no valor de R$ 3.000,00. Poderiam verificar o \
                   pagamento?\n\nObrigado."
                .into(),
            attachments: vec![],
            received_at: Utc::now(),
        },
        RawMessage {
            id: "demo-urgent".into(),
            sender: "diretoria@novaescola.edu.br".into(),
            sender_name: None,
            subject: Some("Urgente: cancelamento de contrato".into()),
            body: "Prezados,\n\nSolicitamos com urgência o cancelamento do contrato da \
                   Escola Nova Esperança. O caso é urgente e precisa de retorno imediato.\n"
                .into(),
            attachments: vec![],
            received_at: Utc::now(),
        },
    ]
}
