//! TCP control plane: accepts one client connection at a time, serving
//! [`Request`]s against a [`Vm`] shared with the executor thread via a
//! single [`Mutex`].
//!
//! The lock is taken once per request (and once per executor cycle,
//! elsewhere) rather than held across a whole connection, so a debug
//! client sitting idle between commands never blocks execution.

use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vm_core::vm::Vm;

use crate::error::DebugError;
use crate::protocol::{read_frame, write_frame, Request, Response};

/// Default bind address, matching the original source's `localhost:12345`.
pub const DEFAULT_ADDR: &str = "127.0.0.1:12345";

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Serve debug requests against `vm` until the VM halts or a client asks
/// it to stop. Binds a single listener and handles one connection at a
/// time, in keeping with the original source's one-client debug socket.
pub fn serve(vm: Arc<Mutex<Vm>>, addr: impl ToSocketAddrs) -> Result<(), DebugError> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;

    loop {
        if should_stop(&vm) {
            return Ok(());
        }

        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &vm) {
                    eprintln!("debug connection ended: {err}");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_BACKOFF);
            }
            Err(err) => return Err(DebugError::Io(err)),
        }
    }
}

fn should_stop(vm: &Arc<Mutex<Vm>>) -> bool {
    let guard = vm.lock().unwrap();
    guard.halted() || guard.stop_requested()
}

fn handle_connection(stream: TcpStream, vm: &Arc<Mutex<Vm>>) -> Result<(), DebugError> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    loop {
        let request: Request = match read_frame(&mut reader) {
            Ok(request) => request,
            Err(DebugError::ConnectionClosed) => return Ok(()),
            Err(err) => return Err(err),
        };

        let response = dispatch(vm, request);
        write_frame(&mut writer, &response)?;
    }
}

fn dispatch(vm: &Arc<Mutex<Vm>>, request: Request) -> Response {
    let mut guard = vm.lock().unwrap();

    match request {
        Request::GetRegisters => Response::Registers(guard.registers().snapshot()),
        Request::SetRegister { index, value } => match guard.set_register(index, value) {
            Ok(()) => Response::Ok,
            Err(err) => Response::Err(err.to_string()),
        },
        Request::GetMemory { addr, len } => {
            let mut bytes = Vec::with_capacity(len as usize);
            for offset in 0..len {
                match guard.read_memory(addr.wrapping_add(offset)) {
                    Ok(byte) => bytes.push(byte),
                    Err(err) => return Response::Err(err.to_string()),
                }
            }
            Response::Memory(bytes)
        }
        Request::SetMemory { addr, bytes } => match guard.write_memory_bytes(addr, &bytes) {
            Ok(()) => Response::Ok,
            Err(err) => Response::Err(err.to_string()),
        },
        Request::GetStack => Response::Stack(guard.stack().snapshot().to_vec()),
        Request::SetStackFromTop { index, value } => {
            match guard.set_stack_from_top(index, value) {
                Ok(()) => Response::Ok,
                Err(err) => Response::Err(err.to_string()),
            }
        }
        Request::GetPc => Response::Pc(guard.pc()),
        Request::SetPc { value } => {
            guard.set_pc(value);
            Response::Ok
        }
        Request::Pause => {
            guard.pause();
            Response::Ok
        }
        Request::Resume => {
            guard.resume();
            Response::Ok
        }
        Request::Halt { message } => {
            guard.halt(message);
            Response::Ok
        }
        Request::Status => Response::Status {
            halted: guard.halted(),
            paused: guard.paused(),
            pc: guard.pc(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn test_vm() -> Arc<Mutex<Vm>> {
        let rom = [0x01, 0x00, 5, 0, 0xFF]; // MOV R0, 5 / HLT
        Arc::new(Mutex::new(Vm::new(&rom).unwrap()))
    }

    #[test]
    fn pause_then_set_register_then_resume_round_trips() {
        let vm = test_vm();

        assert!(matches!(dispatch(&vm, Request::Pause), Response::Ok));
        assert!(matches!(
            dispatch(&vm, Request::SetRegister { index: 0, value: 99 }),
            Response::Ok
        ));
        match dispatch(&vm, Request::GetRegisters) {
            Response::Registers(regs) => assert_eq!(regs[0], 99),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(dispatch(&vm, Request::Resume), Response::Ok));

        let mut guard = vm.lock().unwrap();
        guard.cycle();
        guard.cycle();
        assert!(guard.halted());
    }

    #[test]
    fn get_memory_reads_loaded_rom_bytes() {
        let vm = test_vm();
        match dispatch(
            &vm,
            Request::GetMemory {
                addr: vm_core::isa::ROM_BASE,
                len: 4,
            },
        ) {
            Response::Memory(bytes) => assert_eq!(bytes, vec![0x01, 0x00, 5, 0]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn status_reports_halted_after_a_fatal_error() {
        let vm = Arc::new(Mutex::new(Vm::new(&[0xAB]).unwrap()));
        vm.lock().unwrap().cycle();
        match dispatch(&vm, Request::Status) {
            Response::Status { halted, .. } => assert!(halted),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn request_frames_written_by_a_client_decode_on_the_server_side() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Request::GetStack).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded: Request = read_frame(&mut cursor).unwrap();
        assert!(matches!(decoded, Request::GetStack));
    }
}
