use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde::Deserialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::classify::TimeScope;
use crate::config::Tuning;
use crate::error::{AttestError, error_reason};
use crate::evidence::{EvidenceBundle, EvidenceItem, L1Entry, L1Status};
use crate::plan::{Plan, ToolCall, WeatherParams, extract_data_points};
use crate::rank;
use crate::search::{RawItem, SearchStack};
use crate::weather::{Reading, WeatherProvider};

/// Per-task ceiling inside the executor. The global budget caps the whole
/// fan-out; this keeps one hung tool from eating the entire budget.
const TASK_TIMEOUT: Duration = Duration::from_secs(45);

/// Ceiling for the weather CLI helper subprocess.
const CLI_TIMEOUT: Duration = Duration::from_secs(20);

/// Grace window after cooperative cancellation before stragglers are
/// hard-aborted. Cancelled search tasks use it to flush partial results.
const CANCEL_GRACE: Duration = Duration::from_secs(3);

/// Result of executing a plan: the tiered evidence plus the plan enriched
/// with facts the tools discovered.
pub struct ExecutionOutcome {
    pub bundle: EvidenceBundle,
    pub enriched_plan: Plan,
}

enum TaskOutput {
    Search(Vec<RawItem>),
    Weather(L1Entry),
}

/// Executes a plan's tool calls concurrently with partial-failure
/// tolerance: a failed or timed-out task never cancels its siblings.
pub struct ToolExecutor {
    search: Arc<SearchStack>,
    weather: Arc<WeatherProvider>,
    tuning: Tuning,
}

impl ToolExecutor {
    pub fn new(search: Arc<SearchStack>, weather: Arc<WeatherProvider>, tuning: Tuning) -> Self {
        Self {
            search,
            weather,
            tuning,
        }
    }

    pub async fn execute(&self, plan: &Plan) -> ExecutionOutcome {
        let mut set: JoinSet<TaskOutput> = JoinSet::new();

        // Cooperative cancellation: when the global budget runs out the
        // token is cancelled first, letting search tasks return whatever
        // they already gathered before anything is hard-aborted.
        let cancel = CancellationToken::new();

        for call in &plan.required_tools {
            match call {
                ToolCall::Search(params) => {
                    let stack = self.search.clone();
                    let queries = params.queries.clone();
                    let token = cancel.clone();
                    set.spawn(async move {
                        let items = tokio::time::timeout(
                            TASK_TIMEOUT,
                            run_search(stack, queries, token),
                        )
                        .await
                        .unwrap_or_else(|_| {
                            tracing::warn!("search task hit per-task timeout");
                            Vec::new()
                        });
                        TaskOutput::Search(items)
                    });
                }
                ToolCall::Weather(params) => {
                    let weather = self.weather.clone();
                    let params = params.clone();
                    let scope = plan.time_references.time_scope;
                    let token = cancel.clone();
                    set.spawn(async move {
                        // A weather reading has no useful partial form, so
                        // cancellation just records the failure.
                        let entry = tokio::select! {
                            _ = token.cancelled() => L1Entry::weather_failure(
                                L1Status::ApiError,
                                "weather task cancelled at executor deadline".to_string(),
                            ),
                            res = tokio::time::timeout(
                                TASK_TIMEOUT,
                                run_weather(weather, params, scope),
                            ) => res.unwrap_or_else(|_| {
                                L1Entry::weather_failure(
                                    L1Status::ApiError,
                                    "weather task hit per-task timeout".to_string(),
                                )
                            }),
                        };
                        TaskOutput::Weather(entry)
                    });
                }
            }
        }

        // Collect under the global budget. On exhaustion: cancel, give
        // tasks a grace window to flush, then abort whatever is left.
        let mut raw_items: Vec<RawItem> = Vec::new();
        let mut bundle = EvidenceBundle::default();
        let global = tokio::time::sleep(Duration::from_secs(self.tuning.executor_budget_secs));
        tokio::pin!(global);

        loop {
            tokio::select! {
                biased;
                joined = set.join_next() => match joined {
                    Some(Ok(TaskOutput::Search(items))) => raw_items.extend(items),
                    Some(Ok(TaskOutput::Weather(entry))) => bundle.l1.push(entry),
                    Some(Err(e)) => tracing::error!("tool task failed to join: {e}"),
                    None => break,
                },
                _ = &mut global => {
                    tracing::warn!(pending = set.len(), "executor budget exhausted, cancelling stragglers");
                    cancel.cancel();

                    let grace = tokio::time::sleep(CANCEL_GRACE);
                    tokio::pin!(grace);
                    loop {
                        tokio::select! {
                            biased;
                            joined = set.join_next() => match joined {
                                Some(Ok(TaskOutput::Search(items))) => raw_items.extend(items),
                                Some(Ok(TaskOutput::Weather(entry))) => bundle.l1.push(entry),
                                Some(Err(e)) => tracing::error!("tool task failed to join: {e}"),
                                None => break,
                            },
                            _ = &mut grace => {
                                tracing::warn!(pending = set.len(), "grace window over, aborting remaining tasks");
                                set.abort_all();
                                while set.join_next().await.is_some() {}
                                break;
                            }
                        }
                    }
                    break;
                }
            }
        }

        ingest_ranked(&mut bundle, raw_items);

        // Fallback sweep: when the fan-out produced nothing at all and the
        // plan had a search call, one consolidated pass over the union of
        // planned queries is the last line of defense.
        if bundle.is_empty() {
            let union: Vec<String> = plan
                .required_tools
                .iter()
                .filter_map(|t| match t {
                    ToolCall::Search(s) => Some(s.queries.clone()),
                    _ => None,
                })
                .flatten()
                .collect();
            if !union.is_empty() {
                tracing::warn!("empty bundle after fan-out, running fallback sweep");
                // The sweep runs after the fan-out settled, on a fresh token.
                let swept = run_search(self.search.clone(), union, CancellationToken::new()).await;
                ingest_ranked(&mut bundle, swept);
            }
        }

        bundle.sort_tiers();
        let enriched_plan = enrich_plan(plan, &bundle);
        ExecutionOutcome {
            bundle,
            enriched_plan,
        }
    }
}

/// Fan a query list out across every configured backend in parallel,
/// keeping whatever succeeded. Results are drained as they arrive so a
/// cancelled run still hands back everything gathered up to that point.
async fn run_search(
    stack: Arc<SearchStack>,
    queries: Vec<String>,
    cancel: CancellationToken,
) -> Vec<RawItem> {
    let mut in_flight: FuturesUnordered<_> = queries
        .iter()
        .flat_map(|q| {
            stack.backends.iter().map(move |backend| {
                let query = q.clone();
                async move {
                    match backend.search(&query).await {
                        Ok(items) => {
                            tracing::debug!(backend = backend.name(), query = %query, hits = items.len(), "search ok");
                            items
                        }
                        Err(e) => {
                            tracing::warn!(backend = backend.name(), query = %query, error = %e, "search failed");
                            Vec::new()
                        }
                    }
                }
            })
        })
        .collect();

    let mut gathered: Vec<RawItem> = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::warn!(partial = gathered.len(), "search cancelled, returning partial results");
                break;
            }
            next = in_flight.next() => match next {
                Some(batch) => gathered.extend(batch),
                None => break,
            },
        }
    }
    gathered
}

/// Deduplicate raw items by URL, rank and date them, and drop them into
/// the tier their score dictates. Existing bundle URLs are respected so a
/// sweep never duplicates the primary pass.
fn ingest_ranked(bundle: &mut EvidenceBundle, items: Vec<RawItem>) {
    let mut seen: HashSet<String> = bundle
        .l2
        .iter()
        .chain(bundle.l3.iter())
        .chain(bundle.l4.iter())
        .map(|it| it.url.clone())
        .collect();

    for item in items {
        if item.url.is_empty() || !seen.insert(item.url.clone()) {
            continue;
        }
        let score = rank::rank(&item.url);
        let date = rank::extract_date(
            &item.metatags,
            item.date_hint.as_deref(),
            &item.url,
            &item.snippet,
        );
        bundle.insert_ranked(EvidenceItem {
            source_domain: rank::host_of(&item.url),
            url: item.url,
            title: item.title,
            snippet: item.snippet.replace('\n', " "),
            rank_score: score,
            date,
            full_text: None,
        });
    }
}

/// Execute one weather tool call: provider first, CLI helper as the last
/// resort, and an L1 failure entry when both are out.
async fn run_weather(
    weather: Arc<WeatherProvider>,
    params: WeatherParams,
    scope: TimeScope,
) -> L1Entry {
    let Some(city) = params.city_canonical.clone().filter(|c| !c.trim().is_empty()) else {
        return L1Entry::weather_failure(
            L1Status::InvalidLocation,
            "no resolvable location in the claim (state it like 'Hanoi' or 'Hanoi, VN')".to_string(),
        );
    };

    let mode = weather_mode(&params, scope);
    let result = match mode {
        "historical" => weather.historical(&city, params.date).await,
        "future" => {
            let target = params
                .date
                .unwrap_or_else(|| Utc::now().date_naive() + chrono::Duration::days(params.days_ahead));
            weather.forecast(&city, target, params.part_of_day).await
        }
        _ => weather.current(&city).await,
    };

    match result {
        Ok(Some(reading)) => L1Entry::weather_success(mode, reading),
        // The provider answered but had nothing for the requested window;
        // the CLI helper may still have a cached or alternate source.
        Ok(None) => match run_weather_cli(&city, mode, &params).await {
            Ok(entry) => entry,
            Err(cli_err) => {
                tracing::warn!(reason = error_reason(&cli_err), error = %cli_err, "weather CLI fallback failed");
                L1Entry::weather_failure(
                    L1Status::NoData,
                    format!("weather provider has no data for {city} in the requested window"),
                )
            }
        },
        Err(AttestError::HistoricalDateRequired) => L1Entry::weather_failure(
            L1Status::HistoricalDateRequired,
            "historical weather needs an explicit date".to_string(),
        ),
        Err(AttestError::InvalidLocation(name)) => L1Entry::weather_failure(
            L1Status::InvalidLocation,
            format!("location '{name}' did not geocode"),
        ),
        Err(e) => {
            tracing::warn!(%city, mode, reason = error_reason(&e), error = %e, "weather provider failed, trying CLI helper");
            match run_weather_cli(&city, mode, &params).await {
                Ok(entry) => entry,
                Err(cli_err) => {
                    tracing::warn!(reason = error_reason(&cli_err), error = %cli_err, "weather CLI fallback failed");
                    L1Entry::weather_failure(
                        L1Status::ApiError,
                        format!("weather API and CLI fallback both failed for {city}"),
                    )
                }
            }
        }
    }
}

/// Mode selection: past scope or a negative day offset is historical, a
/// positive offset is a forecast, otherwise current conditions.
pub fn weather_mode(params: &WeatherParams, scope: TimeScope) -> &'static str {
    if scope == TimeScope::Past || params.days_ahead < 0 {
        "historical"
    } else if params.days_ahead > 0 {
        "future"
    } else {
        "present"
    }
}

/// JSON payload printed by the `attest-weather` helper binary.
#[derive(Deserialize)]
struct CliPayload {
    status: String,
    mode: Option<String>,
    data: Option<Reading>,
    reason: Option<String>,
}

/// Run the local weather CLI helper with the same parameters the API call
/// used.
async fn run_weather_cli(
    city: &str,
    mode: &str,
    params: &WeatherParams,
) -> Result<L1Entry, AttestError> {
    // Prefer the sibling binary next to the server executable.
    let program = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("attest-weather")))
        .filter(|p| p.exists())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "attest-weather".to_string());

    let mut cmd = tokio::process::Command::new(&program);
    cmd.arg("--city").arg(city).arg("--mode").arg(mode);
    if let Some(date) = params.date {
        cmd.arg("--date").arg(date.format("%Y-%m-%d").to_string());
    }
    if let Some(pod) = params.part_of_day {
        cmd.arg("--relative").arg(pod.as_str());
    }
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let output = tokio::time::timeout(CLI_TIMEOUT, cmd.output())
        .await
        .map_err(|_| AttestError::Timeout(CLI_TIMEOUT.as_millis() as u64))??;

    if !output.status.success() {
        return Err(AttestError::ProcessExit {
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let payload: CliPayload = serde_json::from_slice(&output.stdout)
        .map_err(|e| AttestError::Malformed(format!("weather CLI output: {e}")))?;
    let entry = match (payload.status.as_str(), payload.data) {
        ("success", Some(reading)) => L1Entry::weather_success(
            payload.mode.as_deref().unwrap_or(mode),
            reading,
        ),
        ("historical_date_required", _) => L1Entry::weather_failure(
            L1Status::HistoricalDateRequired,
            payload.reason.unwrap_or_default(),
        ),
        ("invalid_location", _) => L1Entry::weather_failure(
            L1Status::InvalidLocation,
            payload.reason.unwrap_or_default(),
        ),
        ("no_data", _) => L1Entry::weather_failure(
            L1Status::NoData,
            payload.reason.unwrap_or_default(),
        ),
        (_, _) => L1Entry::weather_failure(
            L1Status::ApiError,
            payload
                .reason
                .unwrap_or_else(|| "weather CLI reported failure".to_string()),
        ),
    };
    Ok(entry)
}

/// Back-annotate the plan with facts the tools discovered: the canonical
/// city of a successful weather reading and numeric data points quoted by
/// trusted snippets.
pub fn enrich_plan(plan: &Plan, bundle: &EvidenceBundle) -> Plan {
    let mut enriched = plan.clone();
    let ev = &mut enriched.entities;

    for entry in &bundle.l1 {
        if entry.tool_name == "weather"
            && entry.status == L1Status::Success
            && let Some(ref reading) = entry.data
        {
            if !reading.location.is_empty() && !ev.locations.iter().any(|l| l == &reading.location)
            {
                ev.locations.push(reading.location.clone());
            }
            for point in [
                format!("{:.0}°C", reading.temperature_c),
                format!("{:.0}%", reading.humidity_pct),
            ] {
                if !ev.data_points.contains(&point) {
                    ev.data_points.push(point);
                }
            }
            break;
        }
    }

    for item in bundle.l2.iter().chain(bundle.l3.iter()) {
        for point in extract_data_points(&item.snippet) {
            if !ev.data_points.contains(&point) {
                ev.data_points.push(point);
            }
        }
    }

    enriched
}
