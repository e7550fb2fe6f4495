pub mod fixtures {
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    use minidom::Element;

    pub fn root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("tests")
            .join("fixtures")
    }

    pub fn path(relative: impl AsRef<Path>) -> PathBuf {
        root().join(relative.as_ref())
    }

    pub fn read(relative: impl AsRef<Path>) -> io::Result<String> {
        fs::read_to_string(path(relative))
    }

    pub fn stanza(name: &str) -> String {
        let relative = Path::new("stanzas").join(name);
        read(&relative).unwrap_or_else(|error| {
            panic!(
                "failed to read fixture {}: {error}",
                relative.to_string_lossy()
            )
        })
    }

    pub fn stanza_element(name: &str) -> Element {
        plover_xmpp::decode_frame(stanza(name).as_bytes())
            .unwrap_or_else(|error| panic!("fixture {name} is not a valid stanza: {error}"))
    }
}

pub mod fakes {
    use std::sync::{Arc, Mutex, MutexGuard};

    use jid::Jid;
    use minidom::Element;
    use plover_xmpp::{
        AttemptId, AuthAttempt, AuthenticationCoordinator, Collaborators, Connection,
        ImSessionEstablisher, ResourceBinder, ResumptionToken,
    };

    /// Every outward call the engine made, in order, across all four
    /// collaborators.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Connect,
        Disconnect,
        Send(Element),
        RestartStream,
        Pause,
        Resume(ResumptionToken),
        AuthorizationRequest(AuthAttempt),
        BindResource(AttemptId, Option<String>),
        RequestSession(AttemptId, Jid),
    }

    #[derive(Default)]
    struct Shared {
        calls: Mutex<Vec<Call>>,
        resumption: Mutex<Option<ResumptionToken>>,
    }

    /// One recorder implementing every collaborator trait; clone it freely,
    /// all clones share the same call log.
    #[derive(Clone, Default)]
    pub struct RecordingCollaborators {
        shared: Arc<Shared>,
    }

    impl RecordingCollaborators {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn collaborators(&self) -> Collaborators {
            Collaborators {
                connection: Arc::new(self.clone()),
                authenticator: Arc::new(self.clone()),
                binder: Arc::new(self.clone()),
                im_session: Arc::new(self.clone()),
            }
        }

        pub fn with_resumption_token(self, token: ResumptionToken) -> Self {
            *lock(&self.shared.resumption) = Some(token);
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            lock(&self.shared.calls).clone()
        }

        pub fn sent(&self) -> Vec<Element> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Send(stanza) => Some(stanza),
                    _ => None,
                })
                .collect()
        }

        pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
            lock(&self.shared.calls).iter().filter(|call| matches(call)).count()
        }

        pub fn last_authorization_request(&self) -> Option<AuthAttempt> {
            lock(&self.shared.calls).iter().rev().find_map(|call| match call {
                Call::AuthorizationRequest(attempt) => Some(attempt.clone()),
                _ => None,
            })
        }

        /// The attempt and resource of the most recent bind request.
        pub fn last_bind_request(&self) -> Option<(AttemptId, Option<String>)> {
            lock(&self.shared.calls).iter().rev().find_map(|call| match call {
                Call::BindResource(attempt, resource) => Some((*attempt, resource.clone())),
                _ => None,
            })
        }

        pub fn clear(&self) {
            lock(&self.shared.calls).clear();
        }

        fn record(&self, call: Call) {
            lock(&self.shared.calls).push(call);
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    impl Connection for RecordingCollaborators {
        fn connect(&self) {
            self.record(Call::Connect);
        }

        fn disconnect(&self) {
            self.record(Call::Disconnect);
        }

        fn send(&self, stanza: Element) {
            self.record(Call::Send(stanza));
        }

        fn restart_stream(&self) {
            self.record(Call::RestartStream);
        }

        fn pause(&self) -> Option<ResumptionToken> {
            self.record(Call::Pause);
            lock(&self.shared.resumption).clone()
        }

        fn resume(&self, token: ResumptionToken) {
            self.record(Call::Resume(token));
        }
    }

    impl AuthenticationCoordinator for RecordingCollaborators {
        fn send_authorization_request(&self, attempt: AuthAttempt) {
            self.record(Call::AuthorizationRequest(attempt));
        }
    }

    impl ResourceBinder for RecordingCollaborators {
        fn bind_resource(&self, attempt: AttemptId, resource: Option<String>) {
            self.record(Call::BindResource(attempt, resource));
        }
    }

    impl ImSessionEstablisher for RecordingCollaborators {
        fn request_session(&self, attempt: AttemptId, address: Jid) {
            self.record(Call::RequestSession(attempt, address));
        }
    }
}
