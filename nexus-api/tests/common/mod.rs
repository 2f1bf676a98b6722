//! Shared test harness: a full registry over in-memory repositories with
//! stubbed DNS and a throwaway CA.

use nexus_api::{
    AgentService, AppState, DnsVerifier, EventBus, RegistryConfig, ResolverService,
    StaticTxtLookup, WebhookDispatcher,
};
use nexus_core::Agent;
use nexus_pki::{CaManager, CertIssuer, TokenIssuer, UserClaims};
use nexus_storage::{
    MemoryAgentRepo, MemoryChallengeRepo, MemoryLedgerRepo, MemoryUserRepo, MemoryWebhookRepo,
};
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_REGISTRY_URL: &str = "https://registry.nexus.test";

/// Everything a test needs to drive the registry end to end.
pub struct TestRegistry {
    pub state: AppState,
    pub lookup: Arc<StaticTxtLookup>,
    pub users: Arc<MemoryUserRepo>,
    pub agents_repo: Arc<MemoryAgentRepo>,
    pub ledger: Arc<MemoryLedgerRepo>,
    pub webhooks_repo: Arc<MemoryWebhookRepo>,
    pub bus: EventBus,
    _ca_dir: tempfile::TempDir,
}

/// Build a registry with small RSA keys (tests only) and no HTTPS
/// enforcement so probe/webhook targets can be local plain-HTTP servers.
pub async fn test_registry() -> TestRegistry {
    let ca_dir = tempfile::tempdir().expect("tempdir");
    let ca = Arc::new(
        CaManager::load_or_create_with_bits(ca_dir.path(), 2048).expect("test CA"),
    );
    let cert_issuer = CertIssuer::with_key_bits(ca.clone(), 2048);
    let tokens = Arc::new(TokenIssuer::new(&ca, TEST_REGISTRY_URL).expect("token issuer"));

    let agents_repo = Arc::new(MemoryAgentRepo::new());
    let challenges_repo = Arc::new(MemoryChallengeRepo::new());
    let ledger = Arc::new(MemoryLedgerRepo::new());
    let webhooks_repo = Arc::new(MemoryWebhookRepo::new());
    let users = Arc::new(MemoryUserRepo::new());

    let config = RegistryConfig {
        registry_url: TEST_REGISTRY_URL.to_string(),
        require_https: false,
        ..RegistryConfig::default()
    };

    let bus = EventBus::default();
    let lookup = Arc::new(StaticTxtLookup::new());
    let dns = Arc::new(DnsVerifier::new(challenges_repo, lookup.clone()));
    let agent_service = Arc::new(AgentService::new(
        agents_repo.clone(),
        ledger.clone(),
        users.clone(),
        dns.clone(),
        cert_issuer,
        tokens.clone(),
        bus.clone(),
        config.clone(),
    ));
    let resolver = Arc::new(ResolverService::new(agents_repo.clone()));
    let webhooks = Arc::new(WebhookDispatcher::new(
        webhooks_repo.clone(),
        config.webhook_timeout,
    ));

    let state = AppState {
        agents: agent_service,
        resolver,
        dns,
        webhooks,
        ledger: ledger.clone(),
        tokens,
        ca_pem: ca.cert_pem().to_string(),
        config,
        start_time: std::time::Instant::now(),
    };

    TestRegistry {
        state,
        lookup,
        users,
        agents_repo,
        ledger,
        webhooks_repo,
        bus,
        _ca_dir: ca_dir,
    }
}

impl TestRegistry {
    /// Run the full DNS-01 flow for `domain` against the stub lookup.
    pub async fn verify_domain(&self, domain: &str) {
        let challenge = self
            .state
            .dns
            .start_challenge(domain)
            .await
            .expect("start challenge");
        self.lookup.insert(&challenge.txt_host, &challenge.txt_record);
        let verified = self
            .state
            .dns
            .verify_challenge(challenge.id)
            .await
            .expect("verify challenge");
        assert!(verified.verified);
    }

    /// Seed a user with a verified email and return its claims.
    pub async fn verified_user(&self, username: &str) -> UserClaims {
        let user_id = Uuid::now_v7();
        let email = format!("{}@example.com", username);
        self.users.insert_user(user_id, &email, true).await;
        user_claims(user_id, username, &email)
    }

    /// Register and activate a domain agent, returning the final record.
    pub async fn activated_domain_agent(&self, domain: &str, capability: &str) -> Agent {
        self.verify_domain(domain).await;
        let (agent, _) = self
            .state
            .agents
            .register(
                nexus_api::RegisterAgentRequest {
                    display_name: "Test Agent".to_string(),
                    description: "integration fixture".to_string(),
                    capability: capability.to_string(),
                    endpoint: format!("https://agents.{}/api", domain),
                    owner_domain: Some(domain.to_string()),
                    ..Default::default()
                },
                None,
            )
            .await
            .expect("register");
        let bundle = self
            .state
            .agents
            .activate(&agent.id.to_string())
            .await
            .expect("activate");
        bundle.agent.agent
    }
}

/// Claims as they would come out of a verified user token.
pub fn user_claims(user_id: Uuid, username: &str, email: &str) -> UserClaims {
    UserClaims {
        sub: user_id.to_string(),
        user_id,
        email: email.to_string(),
        username: username.to_string(),
        tier: "free".to_string(),
        iss: TEST_REGISTRY_URL.to_string(),
        iat: 0,
        exp: i64::MAX,
    }
}
