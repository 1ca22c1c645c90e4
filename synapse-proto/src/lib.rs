//! Synapse ワイヤプロトコル
//!
//! このクレートは、デバッガが話す2つのTCPプロトコルのコーデックを提供します。
//! 長さ付きフレームの独自バイナリプロトコルと、GDB Remote Serial Protocol です。
//! どちらもソケットには触れず、バイト列と型付きの値の変換だけを行います。

pub mod error;
pub mod frame;
pub mod gdb;
pub mod hex;
pub mod message;
pub mod rsp;

pub use error::ProtoError;
pub use frame::{encode_frame, FrameDecoder};
pub use gdb::{GdbCommand, Point, PointKind, Query, Response, StopReply};
pub use message::{
    DisassemblyData, Handshake, MachineState, MemData, MemView, Message, MessageType, TapeList,
    TapeRequest,
};
pub use rsp::{PacketScanner, RspEvent};

/// コーデックの結果型
pub type Result<T> = std::result::Result<T, ProtoError>;
