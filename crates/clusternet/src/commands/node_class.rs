use clusternet_cloud::naming;

pub fn handle() {
    println!("{}", naming::node_class_name(&mut rand::thread_rng()));
}
