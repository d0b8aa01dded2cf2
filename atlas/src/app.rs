use std::str::FromStr;

use crate::client::AtlasClient;
use crate::config::Config;
use crate::documents::DocumentsView;
use crate::error::Result;
use crate::theme::{FileThemeStore, Theme, ThemeSettings, ThemeStore};
use crate::transcript::Transcript;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tab {
    #[default]
    Chat,
    Documents,
}

impl Tab {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Chat => "Chat",
            Self::Documents => "Documents",
        }
    }
}

/// The two views and what they share.
#[derive(Debug)]
pub struct App {
    client: AtlasClient,
    config: Config,
    pub transcript: Transcript,
    pub documents: DocumentsView,
    pub theme: ThemeSettings,
    tab: Tab,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let client = AtlasClient::new(&config.client)?;
        let store = FileThemeStore::new(config.theme.file.clone());
        Ok(Self::with_parts(client, config, Box::new(store)))
    }

    pub fn with_parts(client: AtlasClient, config: Config, theme_store: Box<dyn ThemeStore>) -> Self {
        Self {
            documents: DocumentsView::new(&config.documents),
            transcript: Transcript::new(),
            theme: ThemeSettings::load(theme_store),
            tab: Tab::default(),
            client,
            config,
        }
    }

    pub fn client(&self) -> &AtlasClient {
        &self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn select_tab(&mut self, tab: Tab) {
        self.tab = tab;
    }

    pub fn next_tab(&mut self) -> Tab {
        self.tab = match self.tab {
            Tab::Chat => Tab::Documents,
            Tab::Documents => Tab::Chat,
        };
        self.tab
    }

    /// Send one chat turn with the configured grounding mode.
    pub async fn ask(&mut self, input: &str) {
        self.transcript
            .submit(input, &self.client, self.config.chat.rag_only)
            .await;
    }

    /// Load what the documents tab shows on entry.
    pub async fn open_documents(&mut self) {
        self.tab = Tab::Documents;
        self.documents.refresh(&self.client).await;
        if self.documents.settings().is_none() {
            self.documents.load_settings(&self.client).await;
        }
    }
}

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Chat,
    Docs,
    Find(String),
    Tag(Option<String>),
    Delete(String),
    Clear,
    Copy,
    Theme(Option<Theme>),
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Say(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match name {
            "chat" => Self::Chat,
            "docs" => Self::Docs,
            "find" => Self::Find(arg.to_string()),
            "tag" if arg.is_empty() => Self::Tag(None),
            "tag" => Self::Tag(Some(arg.to_string())),
            "delete" | "rm" if !arg.is_empty() => Self::Delete(arg.to_string()),
            "clear" => Self::Clear,
            "copy" => Self::Copy,
            "theme" if arg.is_empty() => Self::Theme(None),
            "theme" => match Theme::from_str(arg) {
                Ok(theme) => Self::Theme(Some(theme)),
                Err(_) => Self::Unknown(line.to_string()),
            },
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

pub const HELP: &str = "\
Type a question to ask it. Commands:
  /chat                 switch to the chat view
  /docs                 switch to the documents view and reload the list
  /find <text>          filter documents by name or tag
  /tag [name]           show only documents with this tag (no name clears)
  /delete <doc_id>      delete a document (asks for confirmation)
  /clear                start a new conversation
  /copy                 copy the last answer to the clipboard
  /theme [light|dark|system]
  /quit";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::theme::MemoryThemeStore;

    fn app() -> App {
        let config = Config::default();
        let client = AtlasClient::new(&ClientConfig::default()).unwrap();
        App::with_parts(client, config, Box::new(MemoryThemeStore::new(Some(Theme::Dark))))
    }

    #[test]
    fn test_tabs() {
        let mut app = app();
        assert_eq!(app.tab(), Tab::Chat);
        assert_eq!(app.next_tab(), Tab::Documents);
        assert_eq!(app.next_tab(), Tab::Chat);

        app.select_tab(Tab::Documents);
        assert_eq!(app.tab().title(), "Documents");
    }

    #[test]
    fn test_theme_comes_from_store() {
        let app = app();
        assert_eq!(app.theme.preference(), Theme::Dark);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  what is RAG? "), Command::Say("what is RAG?".into()));
        assert_eq!(Command::parse("/docs"), Command::Docs);
        assert_eq!(Command::parse("/find  q3 report "), Command::Find("q3 report".into()));
        assert_eq!(Command::parse("/tag"), Command::Tag(None));
        assert_eq!(Command::parse("/tag draft"), Command::Tag(Some("draft".into())));
        assert_eq!(Command::parse("/delete d1"), Command::Delete("d1".into()));
        assert_eq!(Command::parse("/theme light"), Command::Theme(Some(Theme::Light)));
        assert_eq!(Command::parse("/theme"), Command::Theme(None));
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse("/theme sepia"), Command::Unknown("/theme sepia".into()));
        assert_eq!(Command::parse("/delete"), Command::Unknown("/delete".into()));
    }
}
