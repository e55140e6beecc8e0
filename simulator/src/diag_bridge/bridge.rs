use crate::diag_bridge::model::DiagnosticsModel;
use crate::generator::profile::ScenarioConfig;
use crate::workflow::runner::Runner;
use log::{error, info};
use serde_json::json;
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, RwLock},
    thread,
};
use tokio::runtime::Builder;
use tokio::task;
use warp::{http::StatusCode, Filter};

pub fn bind_address(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

type SharedModel = Arc<RwLock<DiagnosticsModel>>;

fn store(state: &SharedModel, model: DiagnosticsModel) {
    let mut guard = state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = model;
}

fn routes(
    state: SharedModel,
    runner: Arc<Runner>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());
    let runner_filter = warp::any().map(move || runner.clone());

    let get_route = warp::path("diagnostics")
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: SharedModel| {
            let guard = state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            warp::reply::json(&*guard)
        });

    let scenario_route = warp::path("scenario")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter)
        .and(runner_filter)
        .and_then(run_scenario);

    get_route.or(scenario_route)
}

/// Runs a posted scenario on the blocking pool so `GET /diagnostics` stays live.
async fn run_scenario(
    scenario: ScenarioConfig,
    state: SharedModel,
    runner: Arc<Runner>,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, Infallible> {
    let name = scenario.name.clone().unwrap_or_else(|| "unnamed".into());
    let description = scenario.description.clone().unwrap_or_default();
    let outcome = task::spawn_blocking(move || runner.execute_scenario(&scenario))
        .await
        .unwrap_or_else(|err| Err(anyhow::anyhow!("scenario task failed: {}", err)));

    let reply = match outcome {
        Ok(result) => {
            let model = DiagnosticsModel::from(&result);
            info!(
                "scenario {} -> detections {}, intercepted {}",
                name, model.detection_count, model.intercepted
            );
            let body = json!({
                "status": "ok",
                "detections": model.detection_count,
                "intercepted": model.intercepted,
                "description": description
            });
            store(&state, model);
            warp::reply::with_status(warp::reply::json(&body), StatusCode::OK)
        }
        Err(err) => {
            error!("scenario error: {:#}", err);
            warp::reply::with_status(
                warp::reply::json(&json!({
                    "status": "error",
                    "message": format!("{:#}", err)
                })),
                StatusCode::UNPROCESSABLE_ENTITY,
            )
        }
    };
    Ok(reply)
}

/// Holds the latest diagnostics and optionally serves them over HTTP.
pub struct DiagBridge {
    state: SharedModel,
    runner: Arc<Runner>,
}

impl DiagBridge {
    pub fn new(runner: Arc<Runner>) -> Self {
        Self {
            state: Arc::new(RwLock::new(DiagnosticsModel::default())),
            runner,
        }
    }

    /// Starts `GET /diagnostics` and `POST /scenario` on a background thread.
    pub fn serve(&self, address: SocketAddr) {
        let routes = routes(self.state.clone(), self.runner.clone());
        thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("failed to build bridge runtime: {}", err);
                    return;
                }
            };
            runtime.block_on(async move {
                match warp::serve(routes).try_bind_ephemeral(address) {
                    Ok((bound, server)) => {
                        info!("diagnostics bridge listening on http://{}", bound);
                        server.await;
                    }
                    Err(err) => error!("diagnostics bridge failed to bind {}: {}", address, err),
                }
            });
        });
    }

    pub fn publish(&self, model: DiagnosticsModel) {
        info!(
            "publishing {} cycles, {} detections",
            model.cycles.len(),
            model.detection_count
        );
        store(&self.state, model);
    }

    pub fn publish_status(&self, message: &str) {
        info!("[bridge] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> DiagnosticsModel {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::WorkflowConfig;

    #[test]
    fn bridge_publishes_latest_run() {
        let mut cfg = WorkflowConfig::from_args(2, 20.0);
        cfg.system.sonar.max_range_cm = 300.0;
        cfg.system.search.azimuth_steps = 6;
        cfg.system.search.elevation_steps = 4;
        let runner = Arc::new(Runner::new(cfg));
        let bridge = DiagBridge::new(runner.clone());
        assert!(bridge.snapshot().cycles.is_empty());

        let result = runner.execute().unwrap();
        bridge.publish(DiagnosticsModel::from(&result));

        let snapshot = bridge.snapshot();
        assert_eq!(snapshot.cycles.len(), 2);
        assert_eq!(snapshot.detection_count, result.detection_count());
        assert_eq!(snapshot.channels.len(), 4);
    }

    fn quick_runner() -> Arc<Runner> {
        let mut cfg = WorkflowConfig::from_args(2, 20.0);
        cfg.system.sonar.max_range_cm = 300.0;
        cfg.system.search.azimuth_steps = 6;
        cfg.system.search.elevation_steps = 4;
        Arc::new(Runner::new(cfg))
    }

    #[tokio::test]
    async fn posted_scenario_updates_served_diagnostics() {
        let bridge = DiagBridge::new(quick_runner());
        let filter = routes(bridge.state.clone(), bridge.runner.clone());
        let scenario = ScenarioConfig {
            name: Some("posted".into()),
            ..Default::default()
        };

        let response = warp::test::request()
            .method("POST")
            .path("/scenario")
            .json(&scenario)
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], "ok");

        let response = warp::test::request()
            .method("GET")
            .path("/diagnostics")
            .reply(&filter)
            .await;
        let model: DiagnosticsModel = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(model.scenario.as_deref(), Some("posted"));
        assert_eq!(model.cycles.len(), 2);
    }

    #[tokio::test]
    async fn failing_scenario_is_unprocessable() {
        let bridge = DiagBridge::new(quick_runner());
        let filter = routes(bridge.state.clone(), bridge.runner.clone());
        let scenario = ScenarioConfig {
            noise_std: -1.0,
            ..Default::default()
        };
        let response = warp::test::request()
            .method("POST")
            .path("/scenario")
            .json(&scenario)
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(bridge.snapshot().cycles.is_empty());
    }
}
