//! 애플리케이션 조립(composition root) 모듈.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::application::config::Config;
use crate::application::ports::{ConfigRepository, Reporter};
use crate::application::registry::ProviderRegistry;
use crate::application::retry::RetryPolicy;
use crate::application::usecases::dispatch::{DispatchSettings, DispatchUseCase};
use crate::application::usecases::inspect_config::InspectConfigUseCase;
use crate::application::usecases::manage_schedules::ManageSchedulesUseCase;
use crate::application::usecases::provider_catalog::ProviderCatalogUseCase;
use crate::application::usecases::token_manager::TokenManager;
use crate::infrastructure::adapters::{ConsoleReporter, JsonConfigRepository, ProviderWiring};
use crate::infrastructure::oauth::OAuthHttpClient;
use crate::infrastructure::store::JsonFileStore;

/// 실행 시점 의존성을 한 곳에서 조립하는 컨테이너.
pub struct AppComposition {
    config_repo: JsonConfigRepository,
    config: Config,
    store: Arc<JsonFileStore>,
    registry: ProviderRegistry,
    oauth: OAuthHttpClient,
    retry: RetryPolicy,
    reporter: ConsoleReporter,
}

impl AppComposition {
    /// 설정을 읽고 저장소를 연 뒤 제공자 어댑터를 조립한다.
    pub fn load() -> Result<Self> {
        let config_repo = JsonConfigRepository;
        let config = config_repo.load()?;
        let store_path = config.store_path();
        let store = Arc::new(
            JsonFileStore::open(&store_path)
                .with_context(|| format!("failed to open store: {store_path}"))?,
        );
        let wiring = ProviderWiring::new(&config, store.clone())?;
        debug!(store = %store_path, "composition ready");
        Ok(Self {
            registry: wiring.registry(&config),
            oauth: wiring.oauth_client(&config),
            retry: wiring.retry(),
            reporter: ConsoleReporter::new(),
            config_repo,
            config,
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reporter(&self) -> &dyn Reporter {
        &self.reporter
    }

    /// `--user`가 없으면 설정의 기본 사용자.
    pub fn user_id(&self, user: Option<String>) -> String {
        user.unwrap_or_else(|| self.config.user_id())
    }

    /// 설정 점검 유스케이스를 생성한다.
    pub fn inspect_config_usecase(&self) -> InspectConfigUseCase<'_> {
        InspectConfigUseCase {
            config_repo: &self.config_repo,
        }
    }

    pub fn schedules_usecase(&self) -> ManageSchedulesUseCase<'_> {
        ManageSchedulesUseCase {
            schedules: self.store.as_ref(),
            plan: self.config.plan(),
        }
    }

    pub fn token_manager(&self) -> TokenManager<'_> {
        TokenManager {
            tokens: self.store.as_ref(),
            oauth: &self.oauth,
            states: self.store.as_ref(),
            retry: self.retry,
        }
    }

    pub fn catalog_usecase(&self) -> ProviderCatalogUseCase<'_> {
        ProviderCatalogUseCase {
            tokens: self.token_manager(),
            registry: &self.registry,
        }
    }

    /// 일괄 디스패치 유스케이스를 생성한다.
    pub fn dispatch_usecase(&self) -> DispatchUseCase<'_> {
        DispatchUseCase {
            schedules: self.store.as_ref(),
            tokens: self.token_manager(),
            registry: &self.registry,
            reporter: &self.reporter,
            settings: DispatchSettings::from_config(&self.config),
        }
    }
}
