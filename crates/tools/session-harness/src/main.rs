//! CLI session harness for exercising the client data layer end to end
//!
//! This tool allows walking through:
//! - Registration, restore and logout against the scripted remote
//! - Offline reads served from the encrypted cache
//! - OTP attempt exhaustion and recovery
//! - Key provisioning across keystore tiers

use clap::{Parser, Subcommand};
use lenda_core::{normalize_phone, LoanApplication, LoanRecord, LoanStatus, ResourceKind};
use lenda_storage::{
    CacheStore, Database, DraftStore, KeyStoreCapabilities, KeyTier, MockKeyStore, Platform,
    PlatformKeyStore, Preferences, ProfileCache, SecretCipher, SecureKeyValueStore, SessionStore,
    SqliteBlobStore,
};
use lenda_sync::{
    AuthSessionManager, CachePolicy, CancelToken, DomainCache, LoanRepository, MockRemoteApi,
    PaymentRepository, ProfileRepository, RemoteApi, SessionConfig, SyncOrchestrator,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "session-harness")]
#[command(about = "Lenda client session and cache harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk onboarding, browsing, submission, restore and logout
    FullFlow {
        /// Phone number in local format
        #[arg(short, long, default_value = "0712345678")]
        phone: String,

        /// PIN to set during onboarding
        #[arg(long, default_value = "8362")]
        pin: String,
    },

    /// Prime the cache, drop the network, read through the fallbacks
    OfflineRead {
        /// Phone number in local format
        #[arg(short, long, default_value = "0712345678")]
        phone: String,

        /// Account PIN
        #[arg(long, default_value = "8362")]
        pin: String,

        /// Freshness window for the account's loans, in milliseconds
        #[arg(short, long, default_value = "0")]
        ttl_ms: i64,
    },

    /// Exhaust the OTP attempt budget, then recover with a fresh challenge
    LockoutTest {
        /// Phone number in local format
        #[arg(short, long, default_value = "0712345678")]
        phone: String,

        /// Account PIN
        #[arg(long, default_value = "8362")]
        pin: String,
    },

    /// Provision keys across keystore tiers and print the diagnostics
    KeystoreReport {
        /// Key name within the platform store
        #[arg(short, long, default_value = "lenda.master")]
        key_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::FullFlow { phone, pin } => {
            run_full_flow(phone, pin).await?;
        }
        Commands::OfflineRead { phone, pin, ttl_ms } => {
            run_offline_read(phone, pin, ttl_ms).await?;
        }
        Commands::LockoutTest { phone, pin } => {
            run_lockout_test(phone, pin).await?;
        }
        Commands::KeystoreReport { key_name } => {
            run_keystore_report(key_name)?;
        }
    }

    Ok(())
}

/// One simulated device: scripted remote, mock keystore, in-memory database.
struct Device {
    api: Arc<MockRemoteApi>,
    manager: Arc<AuthSessionManager>,
    sessions: SessionStore,
    profile_cache: ProfileCache,
    prefs: Preferences,
    loans: LoanRepository,
    payments: PaymentRepository,
    profile: ProfileRepository,
}

fn device(policy: CachePolicy) -> anyhow::Result<Device> {
    let api = Arc::new(MockRemoteApi::new());
    let keystore = MockKeyStore::new();
    let cipher = Arc::new(SecretCipher::provision(&keystore, "lenda.master")?);
    info!("Provisioned {} key for this run", cipher.tier());

    let db = Arc::new(Database::open_in_memory()?);
    let kv = SecureKeyValueStore::new(
        Arc::new(SqliteBlobStore::new(Arc::clone(&db))),
        Arc::clone(&cipher),
    );
    let sessions = SessionStore::new(kv.clone());
    let prefs = Preferences::new(kv.clone());
    let profile_cache = ProfileCache::new(kv);

    let manager = Arc::new(AuthSessionManager::new(
        Arc::clone(&api) as Arc<dyn RemoteApi>,
        sessions.clone(),
        profile_cache.clone(),
        SessionConfig::default(),
    ));

    let cache = DomainCache::new(CacheStore::new(Arc::clone(&db), Arc::clone(&cipher)), policy);
    let sync = SyncOrchestrator::new(
        Arc::clone(&api) as Arc<dyn RemoteApi>,
        cache,
        sessions.clone(),
    );
    let drafts = DraftStore::new(db, cipher);

    Ok(Device {
        loans: LoanRepository::new(sync.clone(), drafts),
        payments: PaymentRepository::new(sync.clone()),
        profile: ProfileRepository::new(sync, profile_cache.clone(), Arc::clone(&manager)),
        api,
        manager,
        sessions,
        profile_cache,
        prefs,
    })
}

async fn run_full_flow(phone: String, pin: String) -> anyhow::Result<()> {
    info!("Starting full session flow for {}", phone);

    let device = device(CachePolicy::new())?;
    let cancel = CancelToken::new();

    // Onboarding: challenge, verification, PIN.
    let challenge = device.manager.request_otp(&phone).await?;
    info!(
        "OTP dispatched to {} ({} attempts allowed)",
        challenge.phone_number, challenge.max_attempts
    );

    let code = device.api.otp_code();
    info!("Entering code {} from the scripted SMS", code);
    device.manager.verify_otp(&code).await?;
    info!(
        "Code accepted, new user: {}",
        device.manager.is_new_user().unwrap_or(false)
    );

    device.manager.set_pin(&pin).await?;
    info!("PIN set, session state: {}", device.manager.state().as_str());
    device.prefs.set_last_login_phone(&challenge.phone_number)?;

    let profile = device.profile.profile(&cancel).await?;
    info!(
        "Profile for {} came back {:?} ({} remote profile calls)",
        profile.value.phone_number,
        profile.freshness,
        device.api.calls("get_profile")
    );

    // Browse the catalog and apply for the first product.
    let products = device.loans.products(&cancel).await?;
    info!("Catalog has {} products ({:?})", products.value.len(), products.freshness);
    let product = products
        .value
        .first()
        .ok_or_else(|| anyhow::anyhow!("catalog came back empty"))?;
    info!(
        "Applying for '{}' ({} - {} {})",
        product.name, product.min_amount_minor, product.max_amount_minor, product.currency
    );

    let mut application = LoanApplication::new(product.id.clone(), product.currency.clone());
    application.amount_minor = product.min_amount_minor;
    application.term_months = product.min_term_months;

    let draft = device.loans.save_draft(&application)?;
    info!("Draft saved locally at {}", draft.updated_at);

    let receipt = device.loans.submit(&application, &cancel).await?;
    info!("✅ Application acknowledged, reference {}", receipt.reference);

    let drafts = device.loans.drafts()?;
    info!("Drafts remaining after acknowledgment: {}", drafts.len());

    let loans = device.loans.loans(&cancel).await?;
    info!(
        "Loan list now has {} entries ({:?})",
        loans.value.len(),
        loans.freshness
    );

    // A process restart: a fresh manager over the same encrypted stores.
    let restarted = AuthSessionManager::new(
        Arc::clone(&device.api) as Arc<dyn RemoteApi>,
        device.sessions.clone(),
        device.profile_cache.clone(),
        SessionConfig::default(),
    );
    let state = restarted.restore().await?;
    info!(
        "Restart restored state {} with {} refresh calls",
        state.as_str(),
        device.api.calls("refresh_token")
    );
    if let Some(remembered) = device.prefs.last_login_phone()? {
        info!("Sign-in screen would prefill {}", remembered);
    }

    restarted.logout().await?;
    match device.sessions.token()? {
        None => info!("✅ Logout cleared the stored token"),
        Some(_) => warn!("❌ Token survived logout"),
    }

    Ok(())
}

async fn run_offline_read(phone: String, pin: String, ttl_ms: i64) -> anyhow::Result<()> {
    info!("Starting offline read demo, loans window {}ms", ttl_ms);

    let policy = CachePolicy::new().with_ttl(ResourceKind::Loans, ttl_ms);
    let device = device(policy)?;
    let cancel = CancelToken::new();

    // Seed an account with history, then sign in.
    let normalized = normalize_phone(&phone, "254")?;
    let user_id = device.api.register_user(&normalized, &pin, "Amina Odhiambo");
    device.api.set_loans(
        &user_id,
        vec![
            seeded_loan("loan-1", 2_500_000),
            seeded_loan("loan-2", 800_000),
        ],
    );
    device.manager.login_with_pin(&phone, &pin).await?;
    info!("Signed in as {}", user_id);

    let first = device.loans.loans(&cancel).await?;
    info!(
        "First read: {} loans, {:?}, synced at {}",
        first.value.len(),
        first.freshness,
        first.last_synced_at
    );
    let catalog = device.loans.products(&cancel).await?;
    info!("Catalog primed: {:?}", catalog.freshness);

    info!("Dropping the network");
    device.api.set_offline(true);

    // Catalog is still inside its window; no fetch happens.
    let catalog = device.loans.products(&cancel).await?;
    info!("Catalog offline: {:?}", catalog.freshness);

    // The loan window has lapsed, the refetch fails, the stale copy is
    // served with its original sync stamp.
    let stale = device.loans.loans(&cancel).await?;
    info!(
        "Loans offline: {} entries, {:?}, stale: {}, synced at {}",
        stale.value.len(),
        stale.freshness,
        stale.is_stale(),
        stale.last_synced_at
    );

    let profile = device.profile.profile(&cancel).await?;
    info!("Profile offline: {:?}", profile.freshness);

    match device.payments.payments(&cancel).await {
        Ok(fetched) => info!("Payments offline: {:?}", fetched.freshness),
        Err(e) => warn!("❌ Payments offline with nothing cached: {}", e),
    }

    info!("Network restored");
    device.api.set_offline(false);
    let recovered = device.loans.loans(&cancel).await?;
    info!(
        "✅ Loans back to {:?}, synced at {}",
        recovered.freshness, recovered.last_synced_at
    );

    Ok(())
}

async fn run_lockout_test(phone: String, pin: String) -> anyhow::Result<()> {
    info!("Starting OTP lockout test for {}", phone);

    let device = device(CachePolicy::new())?;
    let normalized = normalize_phone(&phone, "254")?;
    device.api.register_user(&normalized, &pin, "Amina Odhiambo");

    let challenge = device.manager.request_otp(&phone).await?;
    info!("Challenge allows {} attempts", challenge.max_attempts);

    for attempt in 1..=challenge.max_attempts {
        match device.manager.verify_otp("000000").await {
            Ok(_) => anyhow::bail!("wrong code was accepted on attempt {}", attempt),
            Err(e) => info!(
                "Attempt {}/{} rejected: {} (state {})",
                attempt,
                challenge.max_attempts,
                e,
                device.manager.state().as_str()
            ),
        }
    }

    let remote_attempts = device.api.calls("verify_otp");
    match device.manager.verify_otp("000000").await {
        Ok(_) => anyhow::bail!("locked flow accepted a code"),
        Err(e) => info!("One more attempt fails locally: {}", e),
    }
    if device.api.calls("verify_otp") == remote_attempts {
        info!(
            "✅ Post-lock attempt never reached the service ({} remote checks total)",
            remote_attempts
        );
    } else {
        warn!("❌ Post-lock attempt hit the service");
    }

    // A fresh challenge is the way out.
    device.manager.request_otp(&phone).await?;
    let code = device.api.otp_code();
    device.manager.verify_otp(&code).await?;
    info!(
        "✅ Fresh challenge verified, state {}",
        device.manager.state().as_str()
    );

    Ok(())
}

fn run_keystore_report(key_name: String) -> anyhow::Result<()> {
    info!("Keystore report for key '{}'", key_name);

    let profiles: [(&str, KeyStoreCapabilities); 3] = [
        (
            "secure element",
            KeyStoreCapabilities {
                has_secure_hardware: true,
                has_strongbox: true,
                has_secure_enclave: false,
                supports_randomized_encryption: true,
                platform: Platform::Android,
            },
        ),
        (
            "software keystore",
            KeyStoreCapabilities {
                has_secure_hardware: false,
                has_strongbox: false,
                has_secure_enclave: false,
                supports_randomized_encryption: true,
                platform: Platform::Android,
            },
        ),
        ("no keystore", KeyStoreCapabilities::default()),
    ];

    for (label, caps) in profiles {
        let store = MockKeyStore::with_capabilities(caps);
        let cipher = SecretCipher::provision(&store, &key_name)?;
        let report = cipher.diagnostics(&store.capabilities());
        info!(
            "{}: tier {}, fingerprint {}, self test {}",
            label,
            report.tier,
            report.key_fingerprint,
            if report.self_test_passed { "✅" } else { "❌" }
        );
    }

    // Hardware that advertises support but fails key creation, the way
    // attestation quota errors show up in the field.
    let flaky = MockKeyStore::with_capabilities(KeyStoreCapabilities {
        has_secure_hardware: true,
        has_strongbox: true,
        has_secure_enclave: false,
        supports_randomized_encryption: true,
        platform: Platform::Android,
    });
    flaky.fail_tier(KeyTier::HardwareBacked);
    let cipher = SecretCipher::provision(&flaky, &key_name)?;
    info!(
        "✅ Hardware creation failure fell back to {} tier",
        cipher.tier()
    );

    // A platform entry invalidated behind our back: the self test catches
    // it and provisioning replaces the key.
    flaky.break_key(&key_name);
    let replaced = SecretCipher::provision(&flaky, &key_name)?;
    if replaced.self_test().is_ok() {
        info!(
            "✅ Broken key replaced, {} key(s) held, tier {}",
            flaky.key_count(),
            replaced.tier()
        );
    } else {
        warn!("❌ Replacement key failed its self test");
    }

    Ok(())
}

fn seeded_loan(id: &str, principal_minor: i64) -> LoanRecord {
    LoanRecord {
        id: id.to_string(),
        product_id: "prod-flexi".to_string(),
        principal_minor,
        outstanding_minor: principal_minor,
        currency: "KES".to_string(),
        status: LoanStatus::Active,
        applied_at: 1_700_000_000_000,
        due_at: Some(1_710_000_000_000),
    }
}
