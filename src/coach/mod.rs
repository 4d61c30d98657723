mod analysis;
mod context;
mod memory;
mod profile;

pub use self::analysis::*;
pub use self::context::*;
pub use self::memory::*;
pub use self::profile::*;

use crate::client::{
    clean_text_for_speech, ChatApi, ChatCompletionsData, ElevenLabsClient, OpenAIClient, SpeechApi,
};
use crate::config::SharedConfig;
use crate::utils::now;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How many conversations the history view returns.
pub const HISTORY_WINDOW: usize = 50;

pub struct AskOutcome {
    pub success: bool,
    pub response: String,
    pub audio: Option<Bytes>,
    pub timestamp: Option<String>,
    pub error: Option<String>,
    pub conversation_count: usize,
}

impl AskOutcome {
    pub fn has_voice(&self) -> bool {
        self.audio.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub conversations: Vec<ConversationRecord>,
    pub user_profile: UserProfile,
    pub total_conversations: usize,
}

/// One user's memory files, loaded once and kept in sync on disk.
pub struct UserStore {
    pub conversations: ConversationStore,
    pub profile: UserProfile,
    profile_path: PathBuf,
}

impl UserStore {
    pub fn open(conversations_path: &Path, profile_path: &Path) -> Self {
        Self {
            conversations: ConversationStore::load(conversations_path),
            profile: UserProfile::load(profile_path),
            profile_path: profile_path.to_path_buf(),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.conversations.save()?;
        self.profile.save(&self.profile_path)
    }
}

/// The coaching service: answers questions through the chat API, narrates
/// through the speech API, and maintains per-user memory.
pub struct Coach {
    config: SharedConfig,
    chat: Arc<dyn ChatApi>,
    speech: Option<Arc<dyn SpeechApi>>,
    stores: Mutex<HashMap<String, Arc<Mutex<UserStore>>>>,
}

impl Coach {
    pub fn init(config: &SharedConfig) -> Result<Self> {
        let (chat, speech) = {
            let config = config.read();
            let chat: Arc<dyn ChatApi> = Arc::new(OpenAIClient::init(&config)?);
            let speech: Option<Arc<dyn SpeechApi>> = if config.voice_ready() {
                Some(Arc::new(ElevenLabsClient::init(&config)?))
            } else {
                None
            };
            (chat, speech)
        };
        Ok(Self::new(config.clone(), chat, speech))
    }

    pub fn new(
        config: SharedConfig,
        chat: Arc<dyn ChatApi>,
        speech: Option<Arc<dyn SpeechApi>>,
    ) -> Self {
        Self {
            config,
            chat,
            speech,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Answers a question. Failures of the chat call or the save step degrade
    /// to an in-character apology, a failed voice or analysis pass only loses
    /// that extra.
    pub async fn ask(&self, user_id: &str, question: &str, want_voice: bool) -> AskOutcome {
        match self.ask_inner(user_id, question, want_voice).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = format!("{err:#}");
                warn!("Failed to answer: {err}");
                let persona = self.config.read().persona.clone();
                AskOutcome {
                    success: false,
                    response: persona.apology(&err),
                    audio: None,
                    timestamp: None,
                    error: Some(err),
                    conversation_count: self.conversation_count(user_id),
                }
            }
        }
    }

    async fn ask_inner(
        &self,
        user_id: &str,
        question: &str,
        want_voice: bool,
    ) -> Result<AskOutcome> {
        let (persona, dry_run, temperature, max_tokens, save) = {
            let config = self.config.read();
            (
                config.persona.clone(),
                config.dry_run,
                config.temperature,
                config.max_output_tokens,
                config.save,
            )
        };

        let store = self.store(user_id);
        let (context, profile_snapshot) = {
            let store = store.lock();
            (
                assemble_context(question, &store.profile, store.conversations.records()),
                store.profile.clone(),
            )
        };

        if dry_run {
            return Ok(AskOutcome {
                success: true,
                response: persona.echo_messages(&context, question),
                audio: None,
                timestamp: None,
                error: None,
                conversation_count: store.lock().conversations.len(),
            });
        }

        let data = ChatCompletionsData {
            messages: persona.build_messages(&context, question),
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
        };
        let output = self.chat.chat_completions(data).await?;
        let response = output.text;

        let audio = if want_voice {
            self.synthesize(&response).await
        } else {
            None
        };

        let timestamp = now();
        let insights = match analyze_conversation(
            self.chat.as_ref(),
            question,
            &response,
            &profile_snapshot,
        )
        .await
        {
            Ok(insights) => Some(insights),
            Err(err) => {
                warn!("Pattern analysis failed, {err:#}");
                None
            }
        };

        let conversation_count = {
            let mut store = store.lock();
            store.conversations.append(ConversationRecord {
                question: question.to_string(),
                response: response.clone(),
                timestamp: timestamp.clone(),
                has_audio: audio.is_some(),
                is_favorite: false,
            });
            if let Some(insights) = &insights {
                apply_insights(&mut store.profile, insights);
            }
            extract_personal_details(&mut store.profile, question);
            let total = store.conversations.len();
            store.profile.record_exchange(&timestamp, total);
            if save {
                store.save()?;
            }
            total
        };

        Ok(AskOutcome {
            success: true,
            response,
            audio,
            timestamp: Some(timestamp),
            error: None,
            conversation_count,
        })
    }

    async fn synthesize(&self, response: &str) -> Option<Bytes> {
        let speech = match &self.speech {
            Some(speech) => speech,
            None => {
                debug!("Voice generation skipped, synthesis is not configured");
                return None;
            }
        };
        let clean_text = clean_text_for_speech(response);
        match speech.synthesize(&clean_text).await {
            Ok(audio) => Some(audio),
            Err(err) => {
                warn!("Voice generation failed, {err:#}");
                None
            }
        }
    }

    pub fn history(&self, user_id: &str) -> HistoryView {
        let store = self.store(user_id);
        let store = store.lock();
        HistoryView {
            conversations: store.conversations.recent(HISTORY_WINDOW).to_vec(),
            user_profile: store.profile.clone(),
            total_conversations: store.conversations.len(),
        }
    }

    pub fn toggle_favorite(&self, user_id: &str, timestamp: &str) -> Result<bool> {
        let store = self.store(user_id);
        let mut store = store.lock();
        let state = store
            .conversations
            .toggle_favorite(timestamp)
            .ok_or_else(|| anyhow!("Conversation not found"))?;
        if self.config.read().save {
            store.conversations.save()?;
        }
        Ok(state)
    }

    pub fn conversation_count(&self, user_id: &str) -> usize {
        self.store(user_id).lock().conversations.len()
    }

    pub fn total_conversations(&self, user_ids: &[String]) -> usize {
        user_ids.iter().map(|id| self.conversation_count(id)).sum()
    }

    /// Writes out the initial empty memory files for a fresh account.
    pub fn create_user_store(&self, user_id: &str) -> Result<()> {
        self.store(user_id).lock().save()
    }

    /// Rewrites every loaded store, used on shutdown.
    pub fn flush(&self) -> Result<()> {
        if !self.config.read().save {
            return Ok(());
        }
        let stores: Vec<_> = self.stores.lock().values().cloned().collect();
        for store in stores {
            store.lock().save()?;
        }
        Ok(())
    }

    fn store(&self, user_id: &str) -> Arc<Mutex<UserStore>> {
        let mut stores = self.stores.lock();
        stores
            .entry(user_id.to_string())
            .or_insert_with(|| {
                let config = self.config.read();
                Arc::new(Mutex::new(UserStore::open(
                    &config.conversations_file(user_id),
                    &config.profile_file(user_id),
                )))
            })
            .clone()
    }
}
