//! Tally CLI - Track board-game tournaments from the command line
//!
//! Offline-first: every command works against the local state file, and the
//! sync engine replicates through a shared remote store file when signed in.

mod cli;
mod error;
mod remote_file;

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};

use tally_core::auth::{AuthStateProvider, AuthUser, SessionHandle};
use tally_core::clock::to_epoch_millis;
use tally_core::models::{
    Participant, Placement, ResultsMode, ScoringRules, SessionResults, SessionStatus,
};
use tally_core::remote::RemoteAdapter;
use tally_core::util::new_entity_id;
use tally_core::{GameSession, LocalStore, SyncOrchestrator, SyncStatusTracker, Tournament};

use crate::cli::{Cli, Commands, ScoringPreset};
use crate::error::CliError;
use crate::remote_file::FileRemoteStore;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tally=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir);
    let remote_path = resolve_remote_path(cli.remote_path, &data_dir);
    let app = App::open(data_dir, remote_path)?;

    match cli.command {
        Commands::Login { user_id, name } => app.run_login(&user_id, name).await?,
        Commands::Logout => app.run_logout().await?,
        Commands::Whoami => app.run_whoami().await?,
        Commands::List { json } => app.run_list(json)?,
        Commands::Show { id } => app.run_show(&id)?,
        Commands::Create { name } => app.run_create(&name).await?,
        Commands::Record {
            game,
            tournament,
            players,
            preset,
        } => {
            app.run_record(&game, tournament.as_deref(), &players, preset)
                .await?;
        }
        Commands::Sync => app.run_sync().await?,
        Commands::Status => app.run_status()?,
    }

    Ok(())
}

/// Locally persisted state: the snapshot plus the active-tournament pointer.
#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalState {
    #[serde(default)]
    snapshot: tally_core::Snapshot,
    #[serde(default)]
    active_tournament_id: Option<String>,
}

struct App {
    data_dir: PathBuf,
    remote_path: PathBuf,
    session: SessionHandle,
    adapter: Arc<RemoteAdapter<FileRemoteStore>>,
    orchestrator: SyncOrchestrator<FileRemoteStore>,
}

impl App {
    fn open(data_dir: PathBuf, remote_path: PathBuf) -> Result<Self, CliError> {
        let session = SessionHandle::new();
        if let Some(user) = load_session(&session_file(&data_dir))? {
            session.sign_in(user);
        }
        let auth: Arc<dyn AuthStateProvider> = Arc::new(session.clone());

        let remote = Arc::new(FileRemoteStore::new(&remote_path));
        let adapter = Arc::new(RemoteAdapter::new(remote, Arc::clone(&auth)));

        let store = LocalStore::new();
        let state = load_local_state(&local_file(&data_dir))?;
        store.hydrate(state.snapshot);
        store.set_active_tournament(state.active_tournament_id);

        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&adapter),
            store,
            SyncStatusTracker::new(),
            auth,
        );

        Ok(Self {
            data_dir,
            remote_path,
            session,
            adapter,
            orchestrator,
        })
    }

    fn require_user(&self) -> Result<AuthUser, CliError> {
        self.session.current_user().ok_or(CliError::NotSignedIn)
    }

    fn persist(&self) -> Result<(), CliError> {
        let store = self.orchestrator.store();
        let state = LocalState {
            snapshot: store.snapshot(),
            active_tournament_id: store.active_tournament_id(),
        };
        save_local_state(&local_file(&self.data_dir), &state)
    }

    async fn run_login(&self, user_id: &str, name: Option<String>) -> Result<(), CliError> {
        let user = AuthUser {
            id: user_id.to_string(),
            display_name: name.clone(),
        };
        self.session.sign_in(user.clone());
        save_session(&session_file(&self.data_dir), &user)?;

        let profile = self.orchestrator.on_sign_in(user_id, name).await?;
        self.persist()?;

        match profile.and_then(|p| p.user_code) {
            Some(code) => println!("Signed in as {user_id} (code {code})"),
            None => println!("Signed in as {user_id}"),
        }
        Ok(())
    }

    async fn run_logout(&self) -> Result<(), CliError> {
        // Flush pending remote writes while the session is still live.
        self.orchestrator.on_sign_out().await;
        self.session.sign_out();
        clear_session(&session_file(&self.data_dir))?;
        self.persist()?;
        println!("Signed out");
        Ok(())
    }

    async fn run_whoami(&self) -> Result<(), CliError> {
        let user = self.require_user()?;
        let profile = self.adapter.ensure_profile(&user.id, None).await?;

        println!("id:    {}", user.id);
        if let Some(name) = profile.display_name.or(user.display_name) {
            println!("name:  {name}");
        }
        if let Some(code) = profile.user_code {
            println!("code:  {code}");
        }
        Ok(())
    }

    fn run_list(&self, as_json: bool) -> Result<(), CliError> {
        let snapshot = self.orchestrator.store().snapshot();
        let active = self.orchestrator.store().active_tournament_id();
        let mut tournaments: Vec<&Tournament> = snapshot.tournaments.values().collect();
        tournaments.sort_by_key(|t| std::cmp::Reverse(to_epoch_millis(t.updated_at.as_ref())));

        if as_json {
            let items: Vec<TournamentListItem> = tournaments
                .iter()
                .map(|t| tournament_to_list_item(t))
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
            return Ok(());
        }

        let now_ms = Utc::now().timestamp_millis();
        for tournament in tournaments {
            let marker = if active.as_deref() == Some(tournament.id.as_str()) {
                "*"
            } else {
                " "
            };
            let short_id = short_id(&tournament.id);
            let relative = format_relative_time(to_epoch_millis(tournament.updated_at.as_ref()), now_ms);
            println!(
                "{marker} {short_id:<13}  {:<28}  {:>2} sessions  {relative}",
                tournament.name,
                tournament.game_sessions.len(),
            );
        }
        Ok(())
    }

    fn run_show(&self, id: &str) -> Result<(), CliError> {
        let snapshot = self.orchestrator.store().snapshot();
        let tournament = resolve_tournament_prefix(&snapshot.tournaments, id)?;

        println!("{} ({})", tournament.name, short_id(&tournament.id));
        if let Some(owner) = &tournament.owner_name {
            println!("owner:    {owner}");
        } else if let Some(owner_id) = &tournament.owner_id {
            println!("owner:    {owner_id}");
        }
        println!("state:    {:?}", tournament.state);
        println!("members:  {}", tournament.member_ids.len());

        let sessions: Vec<&GameSession> = tournament
            .game_sessions
            .iter()
            .filter_map(|sid| snapshot.sessions.get(sid))
            .collect();

        if !sessions.is_empty() {
            println!();
            println!("sessions:");
            let now_ms = Utc::now().timestamp_millis();
            for session in &sessions {
                let relative =
                    format_relative_time(to_epoch_millis(session.played_at.as_ref()), now_ms);
                println!(
                    "  {:<13}  {:<24}  {} players  {relative}",
                    short_id(&session.id),
                    session.game_name,
                    session.participants.len(),
                );
            }
        }

        let standings = compute_standings(&sessions);
        if !standings.is_empty() {
            println!();
            println!("standings:");
            for (rank, (name, points)) in standings.iter().enumerate() {
                println!("  {}. {name:<20} {points} pts", rank + 1);
            }
        }
        Ok(())
    }

    async fn run_create(&self, name: &str) -> Result<(), CliError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CliError::EmptyTournamentName);
        }
        let user = self.require_user()?;

        let tournament = Tournament::new(name, user.id.clone(), user.display_name);
        let id = tournament.id.clone();
        self.orchestrator.save_tournament(tournament).await?;
        self.orchestrator.store().set_active_tournament(Some(id.clone()));
        self.persist()?;

        println!("{id}");
        Ok(())
    }

    async fn run_record(
        &self,
        game: &str,
        tournament_prefix: Option<&str>,
        players: &[String],
        preset: ScoringPreset,
    ) -> Result<(), CliError> {
        let user = self.require_user()?;
        let tournament_id = match tournament_prefix {
            Some(prefix) => {
                let snapshot = self.orchestrator.store().snapshot();
                Some(resolve_tournament_prefix(&snapshot.tournaments, prefix)?.id)
            }
            None => None,
        };

        let session = build_completed_session(game, &user.id, tournament_id, players, preset);
        let id = session.id.clone();
        self.orchestrator.record_session(session).await?;
        self.persist()?;

        println!("{id}");
        Ok(())
    }

    async fn run_sync(&self) -> Result<(), CliError> {
        self.require_user()?;
        self.orchestrator.retry_sync().await?;
        self.persist()?;
        println!("Sync completed");
        Ok(())
    }

    fn run_status(&self) -> Result<(), CliError> {
        let snapshot = self.orchestrator.store().snapshot();

        match self.session.current_user() {
            Some(user) => println!("signed in:    {}", user.id),
            None => println!("signed in:    (no)"),
        }
        println!("remote store: {}", self.remote_path.display());
        println!("tournaments:  {}", snapshot.tournaments.len());
        println!("sessions:     {}", snapshot.sessions.len());
        if let Some(active) = self.orchestrator.store().active_tournament_id() {
            if let Some(tournament) = snapshot.tournaments.get(&active) {
                println!("active:       {} ({})", tournament.name, short_id(&active));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct TournamentListItem {
    id: String,
    name: String,
    state: String,
    sessions: usize,
    members: usize,
    updated_at: i64,
}

fn tournament_to_list_item(tournament: &Tournament) -> TournamentListItem {
    TournamentListItem {
        id: tournament.id.clone(),
        name: tournament.name.clone(),
        state: format!("{:?}", tournament.state).to_lowercase(),
        sessions: tournament.game_sessions.len(),
        members: tournament.member_ids.len(),
        updated_at: to_epoch_millis(tournament.updated_at.as_ref()),
    }
}

/// Build a completed session from an ordered player list (winner first),
/// scored with the chosen preset.
fn build_completed_session(
    game: &str,
    owner_id: &str,
    tournament_id: Option<String>,
    players: &[String],
    preset: ScoringPreset,
) -> GameSession {
    let (rules, preset_name) = match preset {
        ScoringPreset::Standard => (ScoringRules::standard(), "standard"),
        ScoringPreset::WinnerTakesAll => (ScoringRules::winner_takes_all(), "winner-takes-all"),
    };
    let participants: Vec<Participant> = players
        .iter()
        .map(|name| Participant {
            id: new_entity_id(),
            name: name.clone(),
            user_id: None,
        })
        .collect();
    let placements: Vec<Placement> = participants
        .iter()
        .enumerate()
        .map(|(index, participant)| {
            let rank = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
            Placement {
                participant_id: participant.id.clone(),
                rank,
                score: score_for_rank(rules, rank),
            }
        })
        .collect();

    let mut session = GameSession::new(game, owner_id, tournament_id);
    session.preset = Some(preset_name.to_string());
    session.scoring_rules = Some(rules);
    session.participants = participants;
    session.participant_user_ids = vec![owner_id.to_string()];
    session.results = Some(SessionResults {
        mode: ResultsMode::Ranked,
        placements,
    });
    session.status = SessionStatus::Completed;
    session
}

const fn score_for_rank(rules: ScoringRules, rank: u32) -> i32 {
    match rank {
        1 => rules.first,
        2 => rules.second,
        3 => rules.third,
        _ => rules.others,
    }
}

/// Total points per participant name across the given sessions, best first.
fn compute_standings(sessions: &[&GameSession]) -> Vec<(String, i32)> {
    let mut totals: BTreeMap<String, i32> = BTreeMap::new();
    for session in sessions {
        let Some(results) = &session.results else {
            continue;
        };
        for placement in &results.placements {
            let Some(participant) = session
                .participants
                .iter()
                .find(|p| p.id == placement.participant_id)
            else {
                continue;
            };
            *totals.entry(participant.name.clone()).or_insert(0) += placement.score;
        }
    }

    let mut standings: Vec<(String, i32)> = totals.into_iter().collect();
    standings.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    standings
}

fn resolve_tournament_prefix(
    tournaments: &BTreeMap<String, Tournament>,
    query: &str,
) -> Result<Tournament, CliError> {
    if let Some(exact) = tournaments.get(query) {
        return Ok(exact.clone());
    }

    let matches: Vec<&Tournament> = tournaments
        .values()
        .filter(|t| t.id.starts_with(query))
        .collect();
    match matches.len() {
        0 => Err(CliError::TournamentNotFound(query.to_string())),
        1 => Ok(matches[0].clone()),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|t| short_id(&t.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousTournamentId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if timestamp_ms == 0 {
        "never".to_string()
    } else if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

fn session_file(data_dir: &Path) -> PathBuf {
    data_dir.join("session.json")
}

fn local_file(data_dir: &Path) -> PathBuf {
    data_dir.join("local.json")
}

fn load_session(path: &Path) -> Result<Option<AuthUser>, CliError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents).ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CliError::Io(e)),
    }
}

fn save_session(path: &Path, user: &AuthUser) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(user)?)?;
    Ok(())
}

fn clear_session(path: &Path) -> Result<(), CliError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CliError::Io(e)),
    }
}

fn load_local_state(path: &Path) -> Result<LocalState, CliError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents).unwrap_or_default()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LocalState::default()),
        Err(e) => Err(CliError::Io(e)),
    }
}

fn save_local_state(path: &Path, state: &LocalState) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(state)?)?;
    Ok(())
}

fn resolve_data_dir(cli_data_dir: Option<PathBuf>) -> PathBuf {
    cli_data_dir
        .or_else(|| env::var_os("TALLY_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tally")
        })
}

fn resolve_remote_path(cli_remote_path: Option<PathBuf>, data_dir: &Path) -> PathBuf {
    cli_remote_path
        .or_else(|| env::var_os("TALLY_REMOTE_PATH").map(PathBuf::from))
        .unwrap_or_else(|| data_dir.join("remote.json"))
}
