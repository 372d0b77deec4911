//! A fake remote runtime speaking the session protocol over real TCP, and a
//! launcher that stands it up in-process.

#![allow(dead_code)]

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use exobridge::Bridge;
use exobridge::NodeConfig;
use exobridge::launcher::LaunchPlan;
use exobridge::launcher::Launcher;
use exobridge::link::Link;
use exobridge::link::TcpLink;
use exobridge::transport;
use exobridge::transport::DiagnosticSink;
use exobridge::transport::Transport;
use exowire::FaultBody;
use exowire::Frame;
use exowire::MemberShape;
use exowire::RefKind;
use exowire::ReplyBody;
use exowire::Request;
use exowire::TypeShape;
use exowire::WireValue;
use tokio::net::TcpStream;

/// How a launched fake behaves during the handshake.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Behaviour {
    Normal,
    /// Dials back, then never answers anything.
    Silent,
    /// Answers pings but not `connect`.
    NoConnectReply,
    /// Claims to belong to another session.
    AlreadyConnected,
}

#[derive(Default)]
pub struct Stats {
    launches: AtomicUsize,
    new_threads: AtomicUsize,
    describes: Mutex<HashMap<String, usize>>,
}

impl Stats {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn new_threads(&self) -> usize {
        self.new_threads.load(Ordering::SeqCst)
    }

    pub fn describes(&self, type_name: &str) -> usize {
        self.describes.lock().unwrap().get(type_name).copied().unwrap_or(0)
    }
}

pub struct FakeLauncher {
    /// Behaviour per launch; the last one repeats.
    behaviours: Vec<Behaviour>,
    stats: Arc<Stats>,
    /// Back each fake with a real `sleep` process and report its pid.
    with_process: bool,
    /// Pid the fake reports when it has no process behind it.
    pid: Option<u32>,
}

impl FakeLauncher {
    pub fn new(behaviours: &[Behaviour]) -> (Self, Arc<Stats>) {
        let stats = Arc::new(Stats::default());
        let launcher = Self {
            behaviours: behaviours.to_vec(),
            stats: stats.clone(),
            with_process: false,
            pid: None,
        };
        (launcher, stats)
    }

    pub fn with_process(mut self) -> Self {
        self.with_process = true;
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }
}

#[async_trait::async_trait]
impl Launcher for FakeLauncher {
    async fn launch(
        &self,
        plan: &LaunchPlan,
        sink: Arc<dyn DiagnosticSink>,
    ) -> transport::Result<Option<Transport>> {
        let index = self.stats.launches.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviours[index.min(self.behaviours.len() - 1)];

        let process = if self.with_process {
            let mut command = tokio::process::Command::new("sleep");
            command.arg("30");
            Some(Transport::spawn(plan.node, command, sink)?)
        } else {
            None
        };
        let os_pid = process
            .as_ref()
            .and_then(Transport::os_pid)
            .or(self.pid)
            .unwrap_or(40_000 + plan.node.0 as u32);

        let address = plan.address;
        let stats = self.stats.clone();
        tokio::spawn(async move {
            let Ok(stream) = TcpStream::connect(address).await else {
                return;
            };
            let fake = FakeRuntime::new(behaviour, stats, os_pid);
            fake.serve(TcpLink::new(stream)).await;
        });

        Ok(process)
    }
}

/// Handshake tunables short enough for tests.
pub fn config(name: &str) -> NodeConfig {
    NodeConfig::new()
        .with_name(name)
        .with_executable("fake-runtime")
        .with_classpath(Vec::<PathBuf>::new())
        .with_ping_interval(Duration::from_millis(20))
        .with_ping_retry(Duration::from_millis(300))
        .with_connect_timeout(Duration::from_millis(200))
}

pub fn bridge(behaviours: &[Behaviour]) -> (Arc<Bridge>, Arc<Stats>) {
    let (launcher, stats) = FakeLauncher::new(behaviours);
    (Bridge::builder().launcher(launcher).build(), stats)
}

pub const COUNTER: &str = "demo.Counter";
pub const COUNTABLE: &str = "demo.Countable";
pub const OBJECT: &str = "java.lang.Object";
pub const STRING: &str = "java.lang.String";

const CTOR_EMPTY: u64 = 100;
const CTOR_START: u64 = 101;
const ADD: u64 = 110;
const GET: u64 = 111;
const BOOM: u64 = 112;
const STALL: u64 = 113;
const TWICE: u64 = 114;
const ECHO: u64 = 115;
const CRASH: u64 = 116;
const COUNT: u64 = 120;
const CREATED: u64 = 121;
const LENGTH: u64 = 130;

fn member(handle: u64, name: &str, params: &[&str], returns: Option<&str>, is_static: bool) -> MemberShape {
    MemberShape {
        handle,
        name: name.to_string(),
        params: params.iter().map(|p| p.to_string()).collect(),
        returns: returns.map(str::to_string),
        is_static,
    }
}

fn shape(name: &str) -> Option<TypeShape> {
    let shape = match name {
        COUNTER => TypeShape {
            name: COUNTER.into(),
            supertypes: vec![COUNTABLE.into(), OBJECT.into()],
            constructors: vec![
                member(CTOR_EMPTY, "<init>", &[], None, false),
                member(CTOR_START, "<init>", &["long"], None, false),
            ],
            methods: vec![
                member(ADD, "add", &["long"], Some("long"), false),
                member(GET, "get", &[], Some("long"), false),
                member(BOOM, "boom", &[], None, false),
                member(STALL, "stall", &[], None, false),
                member(TWICE, "twice", &["long"], Some("long"), true),
                member(ECHO, "echo", &[OBJECT], Some(OBJECT), true),
                member(CRASH, "crash", &[], None, true),
            ],
            fields: vec![
                member(COUNT, "count", &[], Some("long"), false),
                member(CREATED, "created", &[], Some("long"), true),
            ],
        },
        STRING => TypeShape {
            name: STRING.into(),
            supertypes: vec!["java.lang.CharSequence".into(), OBJECT.into()],
            methods: vec![member(LENGTH, "length", &[], Some("int"), false)],
            ..TypeShape::default()
        },
        "java.lang.IllegalStateException" => TypeShape {
            name: name.into(),
            supertypes: vec!["java.lang.RuntimeException".into(), "java.lang.Exception".into(), OBJECT.into()],
            ..TypeShape::default()
        },
        OBJECT => TypeShape {
            name: OBJECT.into(),
            ..TypeShape::default()
        },
        _ => return None,
    };
    Some(shape)
}

enum Obj {
    Counter(i64),
    Str(String),
    Array(Vec<WireValue>),
    Exception { class: String },
}

impl Obj {
    fn class(&self) -> String {
        match self {
            Self::Counter(_) => COUNTER.into(),
            Self::Str(_) => STRING.into(),
            Self::Array(_) => "[J".into(),
            Self::Exception { class } => class.clone(),
        }
    }
}

enum Outcome {
    Value(WireValue),
    Shape(TypeShape),
    Fault(FaultBody),
    /// Never answer.
    Silence,
    /// Drop the session.
    Crash,
}

fn fault(class: &str, message: impl Into<String>) -> Outcome {
    Outcome::Fault(FaultBody {
        class: class.into(),
        message: message.into(),
        exception: None,
    })
}

struct FakeRuntime {
    behaviour: Behaviour,
    stats: Arc<Stats>,
    os_pid: u32,
    objects: HashMap<u64, Obj>,
    threads: HashSet<u64>,
    next_handle: u64,
    created: i64,
    bound: bool,
}

impl FakeRuntime {
    fn new(behaviour: Behaviour, stats: Arc<Stats>, os_pid: u32) -> Self {
        Self {
            behaviour,
            stats,
            os_pid,
            objects: HashMap::new(),
            threads: HashSet::new(),
            next_handle: 1000,
            created: 0,
            bound: false,
        }
    }

    async fn serve(mut self, link: TcpLink) {
        while let Ok(Some(body)) = link.recv().await {
            let Ok(frame) = Frame::decode(&body) else {
                break;
            };
            let answer = match self.handle(frame) {
                Step::Answer(frame) => frame,
                Step::Quiet => continue,
                Step::Stop => break,
            };
            let Ok(body) = answer.encode() else {
                break;
            };
            if link.send(&body).await.is_err() {
                break;
            }
        }
        link.close().await;
    }

    fn handle(&mut self, frame: Frame) -> Step {
        if self.behaviour == Behaviour::Silent {
            return Step::Quiet;
        }
        match frame {
            Frame::Ping { nonce } => Step::Answer(Frame::Pong { nonce }),
            Frame::Connect { .. } => match self.behaviour {
                Behaviour::NoConnectReply => Step::Quiet,
                Behaviour::AlreadyConnected => Step::Answer(Frame::AlreadyConnected {
                    session: "other-session".into(),
                }),
                _ => {
                    self.bound = true;
                    Step::Answer(Frame::Connected {
                        peer: format!("fake@{}", self.os_pid),
                        os_pid: self.os_pid,
                    })
                }
            },
            Frame::Call { seq, thread, request } => {
                let outcome = if !self.bound {
                    fault("java.lang.IllegalStateException", "not connected")
                } else {
                    self.serve_request(thread, request)
                };
                match outcome {
                    Outcome::Value(value) => Step::Answer(Frame::Reply {
                        seq,
                        body: ReplyBody::Value(value),
                    }),
                    Outcome::Shape(shape) => Step::Answer(Frame::Reply {
                        seq,
                        body: ReplyBody::Shape(shape),
                    }),
                    Outcome::Fault(fault) => Step::Answer(Frame::Fault { seq, fault }),
                    Outcome::Silence => Step::Quiet,
                    Outcome::Crash => Step::Stop,
                }
            }
            Frame::Reset { seq } => {
                self.objects.clear();
                self.threads.clear();
                Step::Answer(Frame::Reply {
                    seq,
                    body: ReplyBody::Value(WireValue::Null),
                })
            }
            // Terminate, or anything a bridge never sends.
            _ => Step::Stop,
        }
    }

    fn alloc(&mut self, obj: Obj) -> WireValue {
        self.next_handle += 1;
        self.objects.insert(self.next_handle, obj);
        WireValue::Ref {
            kind: RefKind::Object,
            handle: self.next_handle,
        }
    }

    fn serve_request(&mut self, thread: Option<u64>, request: Request) -> Outcome {
        if request.affinity() == exowire::Affinity::Thread
            && !thread.is_some_and(|t| self.threads.contains(&t))
        {
            return fault("java.lang.IllegalThreadStateException", "unknown worker thread");
        }

        match request {
            Request::NewThread => {
                self.stats.new_threads.fetch_add(1, Ordering::SeqCst);
                self.next_handle += 1;
                self.threads.insert(self.next_handle);
                Outcome::Value(WireValue::Ref {
                    kind: RefKind::Thread,
                    handle: self.next_handle,
                })
            }
            Request::Free { handle } => {
                self.objects.remove(&handle);
                self.threads.remove(&handle);
                Outcome::Value(WireValue::Null)
            }
            Request::DescribeType { name } => {
                *self.stats.describes.lock().unwrap().entry(name.clone()).or_default() += 1;
                match shape(&name) {
                    Some(shape) => Outcome::Shape(shape),
                    None => fault("java.lang.ClassNotFoundException", name),
                }
            }
            Request::ClassOf { handle } => match self.objects.get(&handle) {
                Some(obj) => Outcome::Value(WireValue::Str(obj.class())),
                None => fault("java.lang.IllegalArgumentException", format!("no object {}", handle)),
            },
            Request::Construct { ctor, args } => {
                let start = match (ctor, args.as_slice()) {
                    (CTOR_EMPTY, []) => 0,
                    (CTOR_START, [WireValue::Int(start)]) => *start,
                    _ => return fault("java.lang.IllegalArgumentException", "bad constructor call"),
                };
                self.created += 1;
                Outcome::Value(self.alloc(Obj::Counter(start)))
            }
            Request::Invoke { method, receiver, args } => self.invoke(method, receiver, args),
            Request::GetField { field, receiver } => match (field, receiver) {
                (COUNT, Some(handle)) => match self.objects.get(&handle) {
                    Some(Obj::Counter(count)) => Outcome::Value(WireValue::Int(*count)),
                    _ => fault("java.lang.NullPointerException", "no counter"),
                },
                (CREATED, None) => Outcome::Value(WireValue::Int(self.created)),
                _ => fault("java.lang.NoSuchFieldException", field.to_string()),
            },
            Request::SetField { field, receiver, value } => match (field, receiver, value) {
                (COUNT, Some(handle), WireValue::Int(v)) => match self.objects.get_mut(&handle) {
                    Some(Obj::Counter(count)) => {
                        *count = v;
                        Outcome::Value(WireValue::Null)
                    }
                    _ => fault("java.lang.NullPointerException", "no counter"),
                },
                (CREATED, None, WireValue::Int(v)) => {
                    self.created = v;
                    Outcome::Value(WireValue::Null)
                }
                _ => fault("java.lang.IllegalArgumentException", "bad field write"),
            },
            Request::NewArray { values, .. } => Outcome::Value(self.alloc(Obj::Array(values))),
            Request::ArrayToList { handle } => match self.objects.get(&handle) {
                Some(Obj::Array(values)) => Outcome::Value(WireValue::Array(values.clone())),
                _ => fault("java.lang.ClassCastException", "not an array"),
            },
            Request::NewString { value } => Outcome::Value(self.alloc(Obj::Str(value))),
            Request::StringToLocal { handle } => match self.objects.get(&handle) {
                Some(Obj::Str(s)) => Outcome::Value(WireValue::Str(s.clone())),
                _ => fault("java.lang.ClassCastException", "not a string"),
            },
            Request::StackTrace { handle } => match self.objects.get(&handle) {
                Some(Obj::Exception { .. }) => Outcome::Value(WireValue::Array(vec![
                    WireValue::Str("demo.Counter.boom(Counter.java:42)".into()),
                    WireValue::Str("exobridge.Node.dispatch(Node.java:7)".into()),
                ])),
                _ => fault("java.lang.ClassCastException", "not a throwable"),
            },
        }
    }

    fn invoke(&mut self, method: u64, receiver: Option<u64>, args: Vec<WireValue>) -> Outcome {
        match (method, receiver, args.as_slice()) {
            (ADD, Some(handle), [WireValue::Int(n)]) => match self.objects.get_mut(&handle) {
                Some(Obj::Counter(count)) => {
                    *count += n;
                    Outcome::Value(WireValue::Int(*count))
                }
                _ => fault("java.lang.NullPointerException", "no counter"),
            },
            (GET, Some(handle), []) => match self.objects.get(&handle) {
                Some(Obj::Counter(count)) => Outcome::Value(WireValue::Int(*count)),
                _ => fault("java.lang.NullPointerException", "no counter"),
            },
            (BOOM, Some(_), []) => {
                let class = "java.lang.IllegalStateException".to_string();
                let exception = self.alloc(Obj::Exception { class: class.clone() });
                let WireValue::Ref { handle, .. } = exception else {
                    unreachable!()
                };
                Outcome::Fault(FaultBody {
                    class,
                    message: "boom".into(),
                    exception: Some(handle),
                })
            }
            (STALL, Some(_), []) => Outcome::Silence,
            (TWICE, None, [WireValue::Int(n)]) => Outcome::Value(WireValue::Int(n * 2)),
            (ECHO, None, [value]) => Outcome::Value(value.clone()),
            (CRASH, None, []) => Outcome::Crash,
            (LENGTH, Some(handle), []) => match self.objects.get(&handle) {
                Some(Obj::Str(s)) => Outcome::Value(WireValue::Int(s.chars().count() as i64)),
                _ => fault("java.lang.NullPointerException", "no string"),
            },
            _ => fault("java.lang.NoSuchMethodException", method.to_string()),
        }
    }
}

enum Step {
    Answer(Frame),
    Quiet,
    Stop,
}
