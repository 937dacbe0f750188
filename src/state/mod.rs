pub mod plot_state;
