//! Signals are frame headers with a value `<= 0`.
//!
//! They carry no payload and tell the receiver something about the state of the
//! conversation instead. The numeric values must match the ones compiled into Bareos.
use strum::{Display, EnumIter, IntoEnumIterator};

#[derive(PartialEq, Eq, Clone, Copy, Debug, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[repr(i32)]
pub enum Signal {
    /// End of data stream, new data may follow.
    EndOfData = -1,
    /// End of data and poll all in one.
    EndOfDataPoll = -2,
    /// Send full status.
    Status = -3,
    /// Conversation terminated, the peer is closing the connection.
    Terminate = -4,
    /// Poll request, the peer is hanging on a read.
    Poll = -5,
    /// Heartbeat response requested.
    Heartbeat = -6,
    /// Only response permitted to a heartbeat.
    HeartbeatResponse = -7,
    /// No longer used.
    Prompt = -8,
    /// Send UTC btime.
    Btime = -9,
    /// Stop current command.
    Break = -10,
    /// Start of a selection list.
    StartSelect = -11,
    /// End of a selection list.
    EndSelect = -12,
    /// Invalid command sent.
    InvalidCommand = -13,
    CommandFailed = -14,
    CommandOk = -15,
    /// Start of command execution.
    CommandBegin = -16,
    MessagesPending = -17,
    /// Server ready and waiting for the next command.
    MainPrompt = -18,
    /// Return selection input.
    SelectInput = -19,
    WarningMessage = -20,
    /// Error message, the command failed.
    ErrorMessage = -21,
    /// Info message, status line.
    InfoMessage = -22,
    /// Run command follows.
    RunCommand = -23,
    /// Request a yes/no response.
    YesNo = -24,
    /// Start restore tree mode.
    StartRestoreTree = -25,
    /// End restore tree mode.
    EndRestoreTree = -26,
    /// The peer is at a sub prompt.
    SubPrompt = -27,
    /// Get text input from user.
    TextInput = -28,
}

impl Signal {
    /// Look up a signal by its header value.
    /// Returns `None` for positive values and unknown codes.
    pub fn from_code(code: i32) -> Option<Signal> {
        if code > 0 {
            return None;
        }
        Signal::iter().find(|signal| signal.code() == code)
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Human readable description as used in log output.
    pub fn description(self) -> &'static str {
        match self {
            Signal::EndOfData => "End of data stream, new data may follow",
            Signal::EndOfDataPoll => "End of data and poll all in one",
            Signal::Status => "Send full status",
            Signal::Terminate => "Conversation terminated, doing close()",
            Signal::Poll => "Poll request, I'm hanging on a read",
            Signal::Heartbeat => "Heartbeat Response requested",
            Signal::HeartbeatResponse => "Only response permitted to HB",
            Signal::Prompt => "No longer used -- Prompt for subcommand",
            Signal::Btime => "Send UTC btime",
            Signal::Break => "Stop current command -- ctl-c",
            Signal::StartSelect => "Start of a selection list",
            Signal::EndSelect => "End of a select list",
            Signal::InvalidCommand => "Invalid command sent",
            Signal::CommandFailed => "Command failed",
            Signal::CommandOk => "Command succeeded",
            Signal::CommandBegin => "Start command execution",
            Signal::MessagesPending => "Messages pending",
            Signal::MainPrompt => "Server ready and waiting",
            Signal::SelectInput => "Return selection input",
            Signal::WarningMessage => "Warning message",
            Signal::ErrorMessage => "Error message -- command failed",
            Signal::InfoMessage => "Info message -- status line",
            Signal::RunCommand => "Run command follows",
            Signal::YesNo => "Request yes no response",
            Signal::StartRestoreTree => "Start restore tree mode",
            Signal::EndRestoreTree => "End restore tree mode",
            Signal::SubPrompt => "Indicate we are at a subprompt",
            Signal::TextInput => "Get text input from user",
        }
    }

    /// Signals after which the peer won't send anything more for the current command.
    pub fn ends_response(self) -> bool {
        matches!(
            self,
            Signal::EndOfData | Signal::Terminate | Signal::MainPrompt | Signal::SubPrompt
        )
    }
}

/// Describe a non-positive header value for logging, known or not.
pub fn describe(code: i32) -> String {
    match Signal::from_code(code) {
        Some(signal) => format!("{} ({code})", signal.description()),
        None => format!("unknown signal ({code})"),
    }
}
