//! Command parsing and execution for the line-oriented interface.
//!
//! Each input line is one operation. Parsing is separated from execution so
//! both can be tested without a terminal: [`parse`] turns a line into a
//! [`Command`], and [`Repl::execute`] runs it against the coordinator,
//! returning the lines to print.

use crate::directory::Directory;
use chrono::NaiveDate;
use std::fmt;
use vaxsched_core::{
    AppointmentId, CaregiverId, ReservationCoordinator, ReservationStore, Role, SchedulerError,
    Session, VaccineName,
};

/// One parsed operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `create_patient <username>`
    CreatePatient {
        /// Username to register.
        username: String,
    },
    /// `create_caregiver <username>`
    CreateCaregiver {
        /// Username to register.
        username: String,
    },
    /// `login_patient <username>`
    LoginPatient {
        /// Username to start a patient session for.
        username: String,
    },
    /// `login_caregiver <username>`
    LoginCaregiver {
        /// Username to start a caregiver session for.
        username: String,
    },
    /// `search_caregiver_schedule <date>`
    SearchCaregiverSchedule {
        /// Date to list availability and stock for.
        date: NaiveDate,
    },
    /// `reserve <date> <vaccine>`
    Reserve {
        /// Requested appointment date.
        date: NaiveDate,
        /// Requested vaccine.
        vaccine: VaccineName,
    },
    /// `upload_availability <date>`
    UploadAvailability {
        /// Date the logged-in caregiver offers.
        date: NaiveDate,
    },
    /// `cancel <appointment_id>`
    Cancel {
        /// Appointment to cancel.
        id: AppointmentId,
    },
    /// `add_doses <vaccine> <number>`
    AddDoses {
        /// Vaccine to top up (created on first top-up).
        vaccine: VaccineName,
        /// Number of doses to add.
        n: u32,
    },
    /// `show_appointments`
    ShowAppointments,
    /// `logout`
    Logout,
    /// `quit`
    Quit,
}

/// Why a line did not parse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Blank input line.
    Empty,
    /// First token is not an operation.
    UnknownOperation(String),
    /// Wrong argument count for a known operation.
    Usage(&'static str),
    /// A date argument was not `YYYY-MM-DD`.
    InvalidDate,
    /// A numeric argument was not a positive integer.
    InvalidNumber,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Please try again!"),
            Self::UnknownOperation(_) => write!(f, "Invalid operation name!"),
            Self::Usage(usage) => write!(f, "Usage: {usage}"),
            Self::InvalidDate => write!(f, "Please enter a valid date!"),
            Self::InvalidNumber => write!(f, "Please enter a valid number!"),
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ParseError::InvalidDate)
}

/// Parse one input line into a [`Command`].
///
/// # Errors
///
/// [`ParseError`] describing what was wrong with the line; its `Display`
/// output is the message to show the user.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((operation, args)) = tokens.split_first() else {
        return Err(ParseError::Empty);
    };
    match (*operation, args) {
        ("create_patient", [username]) => Ok(Command::CreatePatient {
            username: (*username).to_string(),
        }),
        ("create_patient", _) => Err(ParseError::Usage("create_patient <username>")),

        ("create_caregiver", [username]) => Ok(Command::CreateCaregiver {
            username: (*username).to_string(),
        }),
        ("create_caregiver", _) => Err(ParseError::Usage("create_caregiver <username>")),

        ("login_patient", [username]) => Ok(Command::LoginPatient {
            username: (*username).to_string(),
        }),
        ("login_patient", _) => Err(ParseError::Usage("login_patient <username>")),

        ("login_caregiver", [username]) => Ok(Command::LoginCaregiver {
            username: (*username).to_string(),
        }),
        ("login_caregiver", _) => Err(ParseError::Usage("login_caregiver <username>")),

        ("search_caregiver_schedule", [date]) => Ok(Command::SearchCaregiverSchedule {
            date: parse_date(date)?,
        }),
        ("search_caregiver_schedule", _) => {
            Err(ParseError::Usage("search_caregiver_schedule <date>"))
        }

        ("reserve", [date, vaccine]) => Ok(Command::Reserve {
            date: parse_date(date)?,
            vaccine: VaccineName::new(*vaccine),
        }),
        ("reserve", _) => Err(ParseError::Usage("reserve <date> <vaccine>")),

        ("upload_availability", [date]) => Ok(Command::UploadAvailability {
            date: parse_date(date)?,
        }),
        ("upload_availability", _) => Err(ParseError::Usage("upload_availability <date>")),

        ("cancel", [id]) => id
            .parse::<i64>()
            .map(|id| Command::Cancel {
                id: AppointmentId::from_i64(id),
            })
            .map_err(|_| ParseError::InvalidNumber),
        ("cancel", _) => Err(ParseError::Usage("cancel <appointment_id>")),

        ("add_doses", [vaccine, n]) => n
            .parse::<u32>()
            .map(|n| Command::AddDoses {
                vaccine: VaccineName::new(*vaccine),
                n,
            })
            .map_err(|_| ParseError::InvalidNumber),
        ("add_doses", _) => Err(ParseError::Usage("add_doses <vaccine> <number>")),

        ("show_appointments", []) => Ok(Command::ShowAppointments),
        ("show_appointments", _) => Err(ParseError::Usage("show_appointments")),

        ("logout", []) => Ok(Command::Logout),
        ("logout", _) => Err(ParseError::Usage("logout")),

        ("quit", []) => Ok(Command::Quit),
        ("quit", _) => Err(ParseError::Usage("quit")),

        (other, _) => Err(ParseError::UnknownOperation(other.to_string())),
    }
}

/// Command executor: the coordinator plus the session the loop owns.
///
/// The current user is an explicit `Option<Session>` value here, never
/// process-global state.
pub struct Repl<S> {
    coordinator: ReservationCoordinator<S>,
    directory: Directory,
    session: Option<Session>,
}

impl<S: ReservationStore> Repl<S> {
    /// Create an executor over a store with no one logged in.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            coordinator: ReservationCoordinator::new(store),
            directory: Directory::new(),
            session: None,
        }
    }

    /// Execute one command and return the lines to print.
    pub async fn execute(&mut self, command: Command) -> Vec<String> {
        match command {
            Command::CreatePatient { username } => self.create_account(&username, Role::Patient),
            Command::CreateCaregiver { username } => {
                self.create_account(&username, Role::Caregiver)
            }
            Command::LoginPatient { username } => self.login(&username, Role::Patient),
            Command::LoginCaregiver { username } => self.login(&username, Role::Caregiver),
            Command::Logout => self.logout(),
            Command::SearchCaregiverSchedule { date } => self.search_schedule(date).await,
            Command::Reserve { date, vaccine } => self.reserve(date, &vaccine).await,
            Command::UploadAvailability { date } => self.upload_availability(date).await,
            Command::Cancel { id } => self.cancel(id).await,
            Command::AddDoses { vaccine, n } => self.add_doses(&vaccine, n).await,
            Command::ShowAppointments => self.show_appointments().await,
            Command::Quit => vec![],
        }
    }

    fn create_account(&mut self, username: &str, role: Role) -> Vec<String> {
        if self.directory.register(username, role) {
            vec![format!("Created user {username}")]
        } else {
            vec!["Username taken, try again".to_string()]
        }
    }

    fn login(&mut self, username: &str, role: Role) -> Vec<String> {
        if self.session.is_some() {
            return vec!["User already logged in, try again".to_string()];
        }
        if !self.directory.exists(username, role) {
            return vec![format!("Login {role} failed")];
        }
        self.session = Some(Session {
            identity: username.to_string(),
            role,
        });
        vec![format!("Logged in as {username}")]
    }

    fn logout(&mut self) -> Vec<String> {
        if self.session.take().is_some() {
            vec!["Successfully logged out".to_string()]
        } else {
            vec!["Please login first".to_string()]
        }
    }

    async fn search_schedule(&self, date: NaiveDate) -> Vec<String> {
        if self.session.is_none() {
            return vec!["Please login first".to_string()];
        }
        let caregivers = match self.coordinator.store().available_caregivers(date).await {
            Ok(caregivers) => caregivers,
            Err(err) => return vec![err.to_string()],
        };
        let stock = match self.coordinator.store().vaccine_stock().await {
            Ok(stock) => stock,
            Err(err) => return vec![err.to_string()],
        };

        let mut lines = Vec::new();
        if caregivers.is_empty() {
            lines.push("No caregivers available.".to_string());
        } else {
            lines.extend(caregivers.iter().map(ToString::to_string));
        }
        lines.extend(
            stock
                .iter()
                .map(|entry| format!("{} {}", entry.name, entry.doses)),
        );
        lines
    }

    async fn reserve(&self, date: NaiveDate, vaccine: &VaccineName) -> Vec<String> {
        let Some(session) = &self.session else {
            return vec!["Please login first".to_string()];
        };
        if session.role != Role::Patient {
            return vec!["Please login as a patient".to_string()];
        }
        match self.coordinator.book(session, date, vaccine).await {
            Ok(booking) => vec![format!(
                "Appointment ID {}, Caregiver username {}",
                booking.appointment_id, booking.caregiver
            )],
            Err(err) => vec![err.to_string()],
        }
    }

    async fn upload_availability(&self, date: NaiveDate) -> Vec<String> {
        let Some(session) = &self.session else {
            return vec!["Please login as a caregiver first!".to_string()];
        };
        if session.role != Role::Caregiver {
            return vec!["Please login as a caregiver first!".to_string()];
        }
        let caregiver = CaregiverId::new(session.identity.clone());
        match self
            .coordinator
            .store()
            .upload_availability(&caregiver, date)
            .await
        {
            Ok(()) => vec!["Availability uploaded!".to_string()],
            Err(SchedulerError::SlotAlreadyPresent) => {
                vec![format!("Availability for {date} already uploaded")]
            }
            Err(err) => vec![err.to_string()],
        }
    }

    async fn cancel(&self, id: AppointmentId) -> Vec<String> {
        let Some(session) = &self.session else {
            return vec!["Please login first".to_string()];
        };
        match self.coordinator.cancel(session, id).await {
            Ok(()) => vec![format!("Appointment {id} has been successfully canceled")],
            Err(err) => vec![err.to_string()],
        }
    }

    async fn add_doses(&self, vaccine: &VaccineName, n: u32) -> Vec<String> {
        let Some(session) = &self.session else {
            return vec!["Please login as a caregiver first!".to_string()];
        };
        if session.role != Role::Caregiver {
            return vec!["Please login as a caregiver first!".to_string()];
        }
        match self.coordinator.store().add_doses(vaccine, n).await {
            Ok(()) => vec!["Doses updated!".to_string()],
            Err(err) => vec![err.to_string()],
        }
    }

    async fn show_appointments(&self) -> Vec<String> {
        let Some(session) = &self.session else {
            return vec!["Please login first".to_string()];
        };
        match self.coordinator.list_appointments(session).await {
            Ok(appointments) => appointments
                .iter()
                .map(|a| {
                    // Patients see the caregiver, caregivers see the patient.
                    let other = match session.role {
                        Role::Patient => a.caregiver.as_str(),
                        Role::Caregiver => a.patient.as_str(),
                    };
                    format!("{} {} {} {}", a.id, a.vaccine, a.date, other)
                })
                .collect(),
            Err(err) => vec![err.to_string()],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use vaxsched_testing::MemoryStore;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn parse_accepts_the_full_command_surface() {
        assert_eq!(
            parse("create_patient p1"),
            Ok(Command::CreatePatient {
                username: "p1".to_string()
            })
        );
        assert_eq!(
            parse("reserve 2024-07-01 Pfizer"),
            Ok(Command::Reserve {
                date: date("2024-07-01"),
                vaccine: VaccineName::new("Pfizer")
            })
        );
        assert_eq!(
            parse("cancel 3"),
            Ok(Command::Cancel {
                id: AppointmentId::from_i64(3)
            })
        );
        assert_eq!(
            parse("add_doses Moderna 25"),
            Ok(Command::AddDoses {
                vaccine: VaccineName::new("Moderna"),
                n: 25
            })
        );
        assert_eq!(parse("show_appointments"), Ok(Command::ShowAppointments));
        assert_eq!(parse("quit"), Ok(Command::Quit));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert_eq!(
            parse("frobnicate"),
            Err(ParseError::UnknownOperation("frobnicate".to_string()))
        );
        assert_eq!(
            parse("reserve 2024-07-01"),
            Err(ParseError::Usage("reserve <date> <vaccine>"))
        );
        assert_eq!(parse("reserve 07/01/2024 Pfizer"), Err(ParseError::InvalidDate));
        assert_eq!(parse("cancel abc"), Err(ParseError::InvalidNumber));
        assert_eq!(parse("add_doses Pfizer -2"), Err(ParseError::InvalidNumber));
    }

    async fn run(repl: &mut Repl<MemoryStore>, line: &str) -> Vec<String> {
        repl.execute(parse(line).unwrap()).await
    }

    #[tokio::test]
    async fn full_reserve_and_cancel_session() {
        let mut repl = Repl::new(MemoryStore::new());

        // Caregiver side: account, availability, stock.
        run(&mut repl, "create_caregiver alice").await;
        run(&mut repl, "login_caregiver alice").await;
        assert_eq!(
            run(&mut repl, "upload_availability 2024-07-01").await,
            vec!["Availability uploaded!"]
        );
        assert_eq!(run(&mut repl, "add_doses Pfizer 1").await, vec!["Doses updated!"]);
        run(&mut repl, "logout").await;

        // Patient p1 books the only dose.
        run(&mut repl, "create_patient p1").await;
        run(&mut repl, "login_patient p1").await;
        assert_eq!(
            run(&mut repl, "search_caregiver_schedule 2024-07-01").await,
            vec!["alice", "Pfizer 1"]
        );
        assert_eq!(
            run(&mut repl, "reserve 2024-07-01 Pfizer").await,
            vec!["Appointment ID 1, Caregiver username alice"]
        );
        assert_eq!(
            run(&mut repl, "show_appointments").await,
            vec!["1 Pfizer 2024-07-01 alice"]
        );
        run(&mut repl, "logout").await;

        // Patient p2 is out of luck: inventory is checked first.
        run(&mut repl, "create_patient p2").await;
        run(&mut repl, "login_patient p2").await;
        assert_eq!(
            run(&mut repl, "reserve 2024-07-01 Pfizer").await,
            vec!["not enough available doses of Pfizer"]
        );
        // p2 may not cancel p1's appointment either.
        assert_eq!(
            run(&mut repl, "cancel 1").await,
            vec!["not authorized to cancel this appointment"]
        );
        run(&mut repl, "logout").await;

        // p1 cancels; dose and slot come back.
        run(&mut repl, "login_patient p1").await;
        assert_eq!(
            run(&mut repl, "cancel 1").await,
            vec!["Appointment 1 has been successfully canceled"]
        );
        assert_eq!(
            run(&mut repl, "search_caregiver_schedule 2024-07-01").await,
            vec!["alice", "Pfizer 1"]
        );
    }

    #[tokio::test]
    async fn role_gating_matches_the_original_surface() {
        let mut repl = Repl::new(MemoryStore::new());

        assert_eq!(
            run(&mut repl, "reserve 2024-07-01 Pfizer").await,
            vec!["Please login first"]
        );
        assert_eq!(
            run(&mut repl, "upload_availability 2024-07-01").await,
            vec!["Please login as a caregiver first!"]
        );

        run(&mut repl, "create_caregiver alice").await;
        run(&mut repl, "login_caregiver alice").await;
        assert_eq!(
            run(&mut repl, "reserve 2024-07-01 Pfizer").await,
            vec!["Please login as a patient"]
        );
        // Double login is rejected while a session is active.
        assert_eq!(
            run(&mut repl, "login_caregiver alice").await,
            vec!["User already logged in, try again"]
        );

        // Unregistered usernames cannot log in.
        run(&mut repl, "logout").await;
        assert_eq!(
            run(&mut repl, "login_patient ghost").await,
            vec!["Login patient failed"]
        );
    }

    #[tokio::test]
    async fn duplicate_upload_is_reported() {
        let mut repl = Repl::new(MemoryStore::new());
        run(&mut repl, "create_caregiver alice").await;
        run(&mut repl, "login_caregiver alice").await;
        run(&mut repl, "upload_availability 2024-07-01").await;
        assert_eq!(
            run(&mut repl, "upload_availability 2024-07-01").await,
            vec!["Availability for 2024-07-01 already uploaded"]
        );
    }
}
